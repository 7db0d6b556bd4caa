use crate::error::{Error, FetchError};
use crate::network::{Endpoint, fetch_image, render_url};
use crate::storage::{image_path, unique_stems};
use crate::utils;
use crate::window::TimeWindow;
use futures::future::join_all;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Semaphore;

// region: Structs
/// One chart to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Dashboard uid or numeric id, as used in the dashboard URL.
    pub dashboard_id: String,
    /// Human readable part of the dashboard URL.
    pub dashboard_slug: Option<String>,
    /// `None` renders the whole dashboard.
    pub panel_id: Option<String>,
}

impl RenderRequest {
    pub fn panel(dashboard_id: &str, dashboard_slug: Option<&str>, panel_id: &str) -> Self {
        Self {
            dashboard_id: dashboard_id.to_string(),
            dashboard_slug: dashboard_slug.map(str::to_string),
            panel_id: Some(panel_id.to_string()),
        }
    }

    pub fn dashboard(dashboard_id: &str, dashboard_slug: Option<&str>) -> Self {
        Self {
            dashboard_id: dashboard_id.to_string(),
            dashboard_slug: dashboard_slug.map(str::to_string),
            panel_id: None,
        }
    }
}

impl fmt::Display for RenderRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = self.dashboard_slug.as_deref().unwrap_or(&self.dashboard_id);
        match &self.panel_id {
            Some(panel_id) => write!(f, "{} panel {}", name, panel_id),
            None => write!(f, "{} (whole dashboard)", name),
        }
    }
}

/// Outcome of one request. Exactly one of path or error is available.
#[derive(Debug)]
pub struct FetchResult {
    pub request: RenderRequest,
    /// File stem, also the image's Content-ID in the report.
    pub stem: String,
    pub outcome: Result<PathBuf, FetchError>,
}

impl FetchResult {
    pub fn local_path(&self) -> Option<&Path> {
        self.outcome.as_ref().ok().map(PathBuf::as_path)
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.outcome.as_ref().err()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Maximum number of requests in flight. `None` issues the whole batch
    /// at once, `Some(1)` fetches one image after the other.
    pub concurrency_limit: Option<usize>,
    /// Overall limit for the batch. In-flight requests are cancelled when it
    /// passes.
    pub deadline: Option<Duration>,
    pub show_progress: bool,
}
// endregion

/// Fetches every request of a batch and returns one result per request, in
/// input order.
///
/// Individual failures are recorded in the matching [`FetchResult`] and never
/// stop the batch. The outer error is reserved for arguments that are
/// rejected before any request is sent, and for an exceeded deadline.
/// Files written before a deadline cancelled the batch are left in place;
/// [`TempImages::reserve`](crate::storage::TempImages::reserve) covers them.
pub async fn fetch_all(
    requests: &[RenderRequest],
    window: &TimeWindow,
    endpoint: &Endpoint,
    client: &reqwest::Client,
    options: &FetchOptions,
) -> Result<Vec<FetchResult>, Error> {
    if requests.is_empty() {
        return Err(Error::invalid("there are no panels to render"));
    }
    if let Some(request) = requests.iter().find(|r| r.dashboard_id.trim().is_empty()) {
        return Err(Error::invalid(format!("empty dashboard id in request for {}", request)));
    }
    let permits = options
        .concurrency_limit
        .unwrap_or(requests.len())
        .clamp(1, requests.len());
    let semaphore = Semaphore::new(permits);

    // Setup progress bars.
    let wrapper_pb = if options.show_progress {
        indicatif::MultiProgress::new()
    } else {
        indicatif::MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden())
    };
    let loading_pb = wrapper_pb.add(indicatif::ProgressBar::new(requests.len() as u64));
    loading_pb.set_style(
        indicatif::ProgressStyle::default_bar()
            .template(concat!(
                "\x1b[2m[2/4]\x1b[0m",
                " 📥 [{elapsed_precise}] [{bar:40.cyan/blue}] Rendering panel {pos}/{len} {msg}"
            ))
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
            .progress_chars("■┄"),
    );

    let stems = unique_stems(requests);
    let fetches = requests.iter().zip(stems).map(|(request, stem)| {
        let semaphore = &semaphore;
        let loading_pb = loading_pb.clone();
        let line_pb = wrapper_pb.add(indicatif::ProgressBar::new_spinner());
        let url = render_url(endpoint, request, window);
        let target = image_path(&endpoint.work_dir, &stem);

        async move {
            // The semaphore lives as long as this function and is never closed.
            let _permit = semaphore.acquire().await.ok();
            line_pb.set_message(format!(
                "Rendering: {}",
                utils::truncate_message(&request.to_string(), 60)
            ));
            line_pb.enable_steady_tick(Duration::from_millis(100));

            let outcome = match fetch_image(client, endpoint, url, &target).await {
                Ok(size) => {
                    tracing::debug!(%request, size = %utils::kb(size as usize), "image stored");
                    Ok(target)
                }
                Err(e) => {
                    tracing::warn!(%request, "image fetch failed: {e}");
                    Err(e)
                }
            };

            line_pb.finish_and_clear();
            loading_pb.inc(1);
            FetchResult {
                request: request.clone(),
                stem,
                outcome,
            }
        }
    });

    // The futures run on this task, so dropping them on timeout cancels every
    // request still in flight.
    let results = match options.deadline {
        Some(deadline) => match tokio::time::timeout(deadline, join_all(fetches)).await {
            Ok(results) => results,
            Err(_) => {
                loading_pb.abandon_with_message("- ⏰ Deadline exceeded");
                return Err(Error::DeadlineExceeded(deadline));
            }
        },
        None => join_all(fetches).await,
    };
    loading_pb.finish_with_message("- 🏁 Complete!");

    Ok(results)
}
