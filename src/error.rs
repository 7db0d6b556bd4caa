use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a run (or reject it before any network activity).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{failed} of {total} panel images could not be fetched (first failure: {first})")]
    FetchFailed {
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("Dashboard lookup failed for '{dashboard}': {reason}")]
    MetadataLookupFailed { dashboard: String, reason: String },

    #[error("Mail delivery failed: {0}")]
    SendFailed(String),

    #[error("Image batch did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn lookup(dashboard: &str, reason: impl ToString) -> Self {
        Self::MetadataLookupFailed {
            dashboard: dashboard.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Why a single panel image could not be fetched. Recorded per request and
/// never fatal to the batch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("render endpoint returned {0}")]
    Status(StatusCode),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not write image: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// The HTTP status that caused the failure, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Transport(e) => e.status(),
            Self::Io(_) => None,
        }
    }
}
