use crate::batch::RenderRequest;
use crate::error::FetchError;
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

/// Extension of every rendered image. The renderer only produces PNG.
pub const IMAGE_EXTENSION: &str = "png";

/// Derives the file stem for a render request.
///
/// The stem doubles as the Content-ID of the inline image, so it is kept to
/// `[A-Za-z0-9_-]`. Panel renders become `img_<slug>-<panelId>`, whole
/// dashboard renders `img_<slug>`. The dashboard id stands in for a missing
/// slug.
///
/// # Example
///
/// ```rust
/// use panelmail::batch::RenderRequest;
/// use panelmail::storage::image_stem;
///
/// let request = RenderRequest::panel("00123", Some("power usage"), "4");
/// assert_eq!(image_stem(&request), "img_power_usage-4");
/// ```
pub fn image_stem(request: &RenderRequest) -> String {
    let name = request
        .dashboard_slug
        .as_deref()
        .unwrap_or(&request.dashboard_id);
    match &request.panel_id {
        Some(panel_id) => format!("img_{}-{}", sanitize(name), sanitize(panel_id)),
        None => format!("img_{}", sanitize(name)),
    }
}

/// Assigns every request of a batch a stem that no other request in the same
/// batch uses. Repeated stems get a numeric suffix, in input order, skipping
/// any suffixed stem another request already produced.
pub fn unique_stems(requests: &[RenderRequest]) -> Vec<String> {
    let mut issued: HashSet<String> = HashSet::new();
    requests
        .iter()
        .map(|request| {
            let stem = image_stem(request);
            let mut candidate = stem.clone();
            let mut suffix = 1;
            while issued.contains(&candidate) {
                suffix += 1;
                candidate = format!("{stem}-{suffix}");
            }
            issued.insert(candidate.clone());
            candidate
        })
        .collect()
}

/// Where the image with the given stem is stored.
pub fn image_path(work_dir: &Path, stem: &str) -> PathBuf {
    work_dir.join(format!("{}.{}", stem, IMAGE_EXTENSION))
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Streams a response body into `target`.
///
/// If the stream or a write fails half-way the partial file is removed again,
/// so a failed request never leaves an image behind.
pub async fn store_image_on_disk<S, B>(target: &Path, body: S) -> Result<u64, FetchError>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    let file = tokio::fs::File::create(target).await?;

    match copy_body(file, body).await {
        Ok(written) => Ok(written),
        Err(e) => {
            if let Err(remove_error) = tokio::fs::remove_file(target).await {
                tracing::warn!(
                    path = %target.display(),
                    "could not remove partial image: {remove_error}"
                );
            }
            Err(e)
        }
    }
}

async fn copy_body<S, B>(mut file: tokio::fs::File, body: S) -> Result<u64, FetchError>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    let mut body = std::pin::pin!(body);
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(chunk.as_ref()).await?;
        written += chunk.as_ref().len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// The directory a run stores its images in.
///
/// Without an explicit directory every run gets a private, freshly created
/// directory under the system temp dir, removed with everything in it when
/// the value is dropped. An explicit directory is used as is and kept.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    _private: Option<TempDir>,
}

impl WorkDir {
    pub fn create(explicit: Option<&Path>) -> std::io::Result<Self> {
        match explicit {
            Some(path) => Ok(Self {
                path: path.to_path_buf(),
                _private: None,
            }),
            None => {
                let dir = tempfile::Builder::new().prefix("panelmail-").tempdir()?;
                tracing::debug!(path = %dir.path().display(), "created private work dir");
                Ok(Self {
                    path: dir.path().to_path_buf(),
                    _private: Some(dir),
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Owns the images a batch writes and deletes them when dropped.
///
/// Created from the requests before the batch starts, so every image the
/// batch may write is covered: finished ones, files cut short by a deadline,
/// and images of a report that could not be sent.
#[derive(Debug, Default)]
pub struct TempImages {
    paths: Vec<PathBuf>,
}

impl TempImages {
    pub fn reserve(work_dir: &Path, requests: &[RenderRequest]) -> Self {
        Self {
            paths: unique_stems(requests)
                .iter()
                .map(|stem| image_path(work_dir, stem))
                .collect(),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for TempImages {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed temporary image"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), "could not remove temporary image: {e}")
                }
            }
        }
    }
}
