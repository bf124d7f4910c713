//! File sources - the starting points of chains.
//!
//! - `Origin::Local`: reference an existing file. The handle is unowned and
//!   the original is never deleted.
//! - `Origin::LocalCopy`: copy a local file into the workspace (owned).
//! - `Origin::Remote`: fetch through a [`FetchBackend`] into the workspace
//!   (owned). The destination is registered before the fetch starts, so a
//!   cancelled or failed fetch never leaks a partial file.

mod fetch;

pub use fetch::{FetchBackend, MirrorFetcher, RemoteRef};

use crate::workflow::{FileHandle, PathHint, Workflow};
use gisflow_shared::errors::{GisflowError, GisflowResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Where a chain's first file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Local(PathBuf),
    LocalCopy(PathBuf),
    Remote(RemoteRef),
}

impl Origin {
    /// `scheme://...` becomes `Remote` (except `file://`), anything else `Local`.
    pub fn parse(raw: &str) -> GisflowResult<Self> {
        if let Some(path) = raw.strip_prefix("file://") {
            return Ok(Origin::Local(PathBuf::from(path)));
        }
        if raw.contains("://") {
            return Ok(Origin::Remote(raw.parse()?));
        }
        Ok(Origin::Local(PathBuf::from(raw)))
    }
}

impl From<PathBuf> for Origin {
    fn from(path: PathBuf) -> Self {
        Origin::Local(path)
    }
}

impl From<&Path> for Origin {
    fn from(path: &Path) -> Self {
        Origin::Local(path.to_path_buf())
    }
}

/// Always a local path; use [`Origin::parse`] for URLs.
impl From<&str> for Origin {
    fn from(path: &str) -> Self {
        Origin::Local(PathBuf::from(path))
    }
}

impl From<RemoteRef> for Origin {
    fn from(reference: RemoteRef) -> Self {
        Origin::Remote(reference)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local(path) => write!(f, "{}", path.display()),
            Origin::LocalCopy(path) => write!(f, "copy of {}", path.display()),
            Origin::Remote(reference) => write!(f, "{}", reference),
        }
    }
}

/// Opens origins as handles registered with one workflow.
#[derive(Clone)]
pub struct FileSource {
    workflow: Workflow,
    fetcher: Option<Arc<dyn FetchBackend>>,
}

impl FileSource {
    pub fn new(workflow: &Workflow) -> Self {
        Self {
            workflow: workflow.clone(),
            fetcher: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn FetchBackend>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Resolve `origin` to a handle usable as the left side of a composition.
    ///
    /// Every failure to produce the file is reported as `SourceUnavailable`,
    /// except `ContextClosed` when the workflow is not active.
    pub async fn open(&self, origin: impl Into<Origin>) -> GisflowResult<FileHandle> {
        let origin = origin.into();
        let start = Instant::now();

        let handle = match &origin {
            Origin::Local(path) => self.open_local(path).await?,
            Origin::LocalCopy(path) => self.copy_local(path).await?,
            Origin::Remote(reference) => self.fetch_remote(reference).await?,
        };

        self.workflow.record_source();
        tracing::debug!(
            workflow_id = %self.workflow.id(),
            origin = %origin,
            path = %handle.path().display(),
            owned = handle.is_owned(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Opened file source"
        );
        Ok(handle)
    }

    async fn open_local(&self, path: &Path) -> GisflowResult<FileHandle> {
        let resolved = ensure_readable_file(path).await?;
        self.workflow.adopt(resolved)
    }

    async fn copy_local(&self, path: &Path) -> GisflowResult<FileHandle> {
        let resolved = ensure_readable_file(path).await?;
        let hint = file_name_hint(&resolved);
        let handle = self.workflow.acquire(hint)?;

        fetch::stream_copy(&resolved, handle.path())
            .await
            .map_err(|e| {
                GisflowError::SourceUnavailable(format!(
                    "Failed to copy {} into workspace: {}",
                    resolved.display(),
                    e
                ))
            })?;
        Ok(handle)
    }

    async fn fetch_remote(&self, reference: &RemoteRef) -> GisflowResult<FileHandle> {
        let fetcher = self.fetcher.as_ref().ok_or_else(|| {
            GisflowError::SourceUnavailable(format!("no fetch backend configured for {}", reference))
        })?;

        let handle = self
            .workflow
            .acquire(PathHint::new().file_name(reference.file_name()))?;

        tracing::debug!(
            workflow_id = %self.workflow.id(),
            backend = fetcher.name(),
            reference = %reference,
            "Fetching remote source"
        );

        let fetch = fetcher.fetch(reference, handle.path());
        let fetched = match self.workflow.options().fetch_timeout() {
            Some(limit) => tokio::time::timeout(limit, fetch).await.map_err(|_| {
                GisflowError::SourceUnavailable(format!(
                    "fetch of {} timed out after {}ms",
                    reference,
                    limit.as_millis()
                ))
            })?,
            None => fetch.await,
        };

        let bytes = fetched.map_err(|e| match e {
            GisflowError::SourceUnavailable(_) => e,
            other => GisflowError::SourceUnavailable(format!("{}: {}", reference, other)),
        })?;

        tracing::trace!(reference = %reference, bytes, "Fetched remote source");
        Ok(handle)
    }
}

async fn ensure_readable_file(path: &Path) -> GisflowResult<PathBuf> {
    let resolved = tokio::fs::canonicalize(path).await.map_err(|e| {
        GisflowError::SourceUnavailable(format!("{}: {}", path.display(), e))
    })?;
    let meta = tokio::fs::metadata(&resolved).await.map_err(|e| {
        GisflowError::SourceUnavailable(format!("{}: {}", resolved.display(), e))
    })?;
    if !meta.is_file() {
        return Err(GisflowError::SourceUnavailable(format!(
            "{} is not a regular file",
            resolved.display()
        )));
    }
    Ok(resolved)
}

fn file_name_hint(path: &Path) -> PathHint {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => PathHint::new().file_name(name),
        None => PathHint::new().label("source"),
    }
}
