//! Remote references and pluggable fetch backends.

use async_trait::async_trait;
use gisflow_shared::errors::{GisflowError, GisflowResult};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// A `scheme://authority/key` address of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteRef {
    scheme: String,
    authority: String,
    key: String,
}

impl RemoteRef {
    pub fn new(
        scheme: impl Into<String>,
        authority: impl Into<String>,
        key: impl Into<String>,
    ) -> GisflowResult<Self> {
        let reference = Self {
            scheme: scheme.into().to_ascii_lowercase(),
            authority: authority.into(),
            key: key.into().trim_start_matches('/').to_string(),
        };
        reference.validate()?;
        Ok(reference)
    }

    /// e.g. `s3`, `gs`, `https`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Bucket or host.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last segment of the key, used to name the local copy.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    fn validate(&self) -> GisflowResult<()> {
        let scheme_ok = !self.scheme.is_empty()
            && self
                .scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !scheme_ok {
            return Err(GisflowError::InvalidArgument(format!(
                "invalid scheme in remote reference: {:?}",
                self.scheme
            )));
        }
        if self.authority.is_empty() {
            return Err(GisflowError::InvalidArgument(format!(
                "remote reference has no authority: {}",
                self
            )));
        }
        if self.key.is_empty() || self.key.ends_with('/') {
            return Err(GisflowError::InvalidArgument(format!(
                "remote reference must name an object: {}",
                self
            )));
        }
        Ok(())
    }
}

impl FromStr for RemoteRef {
    type Err = GisflowError;

    fn from_str(s: &str) -> GisflowResult<Self> {
        let (scheme, rest) = s.split_once("://").ok_or_else(|| {
            GisflowError::InvalidArgument(format!("not a remote reference (missing '://'): {}", s))
        })?;
        let (authority, key) = rest.split_once('/').unwrap_or((rest, ""));
        RemoteRef::new(scheme, authority, key)
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.authority, self.key)
    }
}

/// Trait for retrieving remote objects into local files.
///
/// Implementations write the complete object to `destination` (which does
/// not exist yet) and return the number of bytes written. Any error is
/// surfaced to callers as `SourceUnavailable`. Dropping the future must be
/// safe: the destination is already registered for cleanup.
#[async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, reference: &RemoteRef, destination: &Path) -> GisflowResult<u64>;

    /// Human-readable backend name for logging.
    fn name(&self) -> &str;
}

/// Serves remote references from a local mirror directory.
///
/// `s3://bucket/dem/tile.tif` resolves to `<root>/bucket/dem/tile.tif`,
/// regardless of scheme. Useful for offline mirrors and synced buckets.
#[derive(Debug, Clone)]
pub struct MirrorFetcher {
    root: PathBuf,
}

impl MirrorFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, reference: &RemoteRef) -> GisflowResult<PathBuf> {
        let relative = Path::new(reference.authority()).join(reference.key());
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(GisflowError::SourceUnavailable(format!(
                "{} escapes the mirror root",
                reference
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FetchBackend for MirrorFetcher {
    async fn fetch(&self, reference: &RemoteRef, destination: &Path) -> GisflowResult<u64> {
        let source = self.resolve(reference)?;
        stream_copy(&source, destination).await.map_err(|e| {
            GisflowError::SourceUnavailable(format!(
                "{} (mirror path {}): {}",
                reference,
                source.display(),
                e
            ))
        })
    }

    fn name(&self) -> &str {
        "mirror"
    }
}

/// Chunked async copy of `source` into a new file at `destination`.
pub(crate) async fn stream_copy(source: &Path, destination: &Path) -> std::io::Result<u64> {
    let reader = tokio::fs::File::open(source).await?;
    let mut reader = BufReader::with_capacity(COPY_BUFFER_BYTES, reader);

    let writer = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .await?;
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_BYTES, writer);

    let bytes = tokio::io::copy_buf(&mut reader, &mut writer).await?;
    writer.flush().await?;
    Ok(bytes)
}
