use crate::batch::RenderRequest;
use crate::error::FetchError;
use crate::storage::store_image_on_disk;
use crate::window::TimeWindow;
use base64::Engine;
use reqwest::header::AUTHORIZATION;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Credential attached to every request against the rendering service.
#[derive(Clone)]
pub enum Credential {
    /// Grafana API key or service account token.
    Bearer(String),
    /// `username:password`.
    Basic(String),
}

impl Credential {
    fn header_value(&self) -> String {
        match self {
            Self::Bearer(token) => format!("Bearer {}", token),
            Self::Basic(auth) => format!(
                "Basic {}",
                base64::engine::general_purpose::STANDARD.encode(auth.as_bytes())
            ),
        }
    }

    /// Attaches the credential as an `Authorization` header.
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(AUTHORIZATION, self.header_value())
    }
}

// Keep tokens out of debug output and logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(***)"),
            Self::Basic(_) => f.write_str("Basic(***)"),
        }
    }
}

/// Where and how panel images are rendered and stored.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub base_url: Url,
    pub credential: Option<Credential>,
    pub width: u32,
    pub height: u32,
    /// Directory the rendered images are written to.
    pub work_dir: PathBuf,
}

impl Endpoint {
    pub fn new(base_url: Url, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url,
            credential: None,
            width: crate::options::defaults::WIDTH,
            height: crate::options::defaults::HEIGHT,
            work_dir: work_dir.into(),
        }
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Joins path segments onto the base URL, keeping any sub-path the
    /// server is mounted under (e.g. `https://host/grafana`).
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credential {
            Some(credential) => credential.apply(request),
            None => request,
        }
    }
}

/// Options for the shared HTTP client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub user_agent: String,
    pub accept_invalid_certs: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: crate::options::defaults::USER_AGENT.to_string(),
            accept_invalid_certs: false,
        }
    }
}

/// Builds and configures the HTTP client.
///
/// No overall request timeout is set: the renderer can take a long time for
/// large dashboards, and the batch deadline covers hangs.
pub fn build_client(options: &ClientOptions) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(options.user_agent.as_str())
        .danger_accept_invalid_certs(options.accept_invalid_certs)
        .build()
}

/// Builds the render URL for one request:
/// `{base}/render/d-solo/{dashboardId}/{slug}?panelId=..&from=..&to=..&width=..&height=..`
///
/// Without a panel id the `panelId` parameter is left out, which asks the
/// renderer for the whole dashboard.
pub fn render_url(endpoint: &Endpoint, request: &RenderRequest, window: &TimeWindow) -> Url {
    let slug = request
        .dashboard_slug
        .as_deref()
        .unwrap_or(&request.dashboard_id);
    let mut url = endpoint.url(&["render", "d-solo", &request.dashboard_id, slug]);
    {
        let mut query = url.query_pairs_mut();
        if let Some(panel_id) = &request.panel_id {
            query.append_pair("panelId", panel_id);
        }
        query
            .append_pair("from", &window.start_millis().to_string())
            .append_pair("to", &window.end_millis().to_string())
            .append_pair("width", &endpoint.width.to_string())
            .append_pair("height", &endpoint.height.to_string());
    }
    url
}

/// Downloads a single rendered image to `target`.
///
/// Only a `200 OK` counts as success; anything else is reported as
/// [`FetchError::Status`] and no file is created.
pub async fn fetch_image(
    client: &reqwest::Client,
    endpoint: &Endpoint,
    url: Url,
    target: &Path,
) -> Result<u64, FetchError> {
    tracing::debug!(%url, "requesting image");
    let response = endpoint.authorize(client.get(url)).send().await?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(FetchError::Status(response.status()));
    }

    store_image_on_disk(target, response.bytes_stream()).await
}

/// Fetches a JSON document from the rendering service's API.
pub async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    endpoint: &Endpoint,
    url: Url,
) -> Result<T, reqwest::Error> {
    tracing::debug!(%url, "requesting json");
    endpoint
        .authorize(client.get(url))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}
