// Library interface for panelmail
// This allows integration tests to access the modules

pub mod batch;
pub mod dashboard;
pub mod error;
pub mod mailer;
pub mod metrics;
pub mod network;
pub mod options;
pub mod report;
pub mod storage;
pub mod utils;
pub mod window;
