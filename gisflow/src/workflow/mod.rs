//! Workflow - the lifecycle manager for temp files.
//!
//! A workflow owns one workspace directory under the configured temp root.
//! Every file produced inside it is registered here and deleted when the
//! workflow closes, whichever way the enclosing scope exits.
//!
//! ## State machine
//!
//! ```text
//! Idle ──enter()──▶ Active ──close()──▶ Closed
//!   └──────────────close()──────────────▶┘
//! ```
//!
//! - `acquire()` / `adopt()` succeed only while Active.
//! - `close()` is idempotent; the purge runs exactly once.
//! - `WorkflowScope` closes on drop (normal return, error, panic, cancellation).

mod cleanup;
mod handle;
mod metrics;
mod registry;
mod scope;

pub use cleanup::CleanupReport;
pub use handle::FileHandle;
pub use metrics::WorkflowMetrics;
pub use registry::{LifecycleState, PathHint, RegistryEntry};
pub use scope::WorkflowScope;

use crate::options::WorkflowOptions;
use chrono::{DateTime, Utc};
use gisflow_shared::errors::{GisflowError, GisflowResult};
use metrics::WorkflowMetricsStorage;
use registry::Registry;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use ulid::Ulid;

/// Unique identifier of a workflow context.
pub type WorkflowId = Ulid;

/// Shared handle to a workflow context. Clones share the same registry.
#[derive(Clone)]
pub struct Workflow {
    inner: Arc<WorkflowInner>,
}

struct WorkflowInner {
    id: WorkflowId,
    options: WorkflowOptions,
    /// Fixed at construction; created on enter().
    workspace: PathBuf,
    created_at: DateTime<Utc>,
    registry: Registry,
    metrics: WorkflowMetricsStorage,
}

impl Workflow {
    /// Create an Idle workflow. Nothing touches the filesystem until `enter()`.
    pub fn new(options: WorkflowOptions) -> GisflowResult<Self> {
        options.sanitize()?;

        let id = Ulid::new();
        let workspace = options
            .temp_root
            .join(format!("{}-{}", options.prefix, id.to_string().to_lowercase()));

        Ok(Self {
            inner: Arc::new(WorkflowInner {
                id,
                options,
                workspace,
                created_at: Utc::now(),
                registry: Registry::new(),
                metrics: WorkflowMetricsStorage::default(),
            }),
        })
    }

    /// Idle → Active. Creates the workspace directory.
    pub fn enter(&self) -> GisflowResult<()> {
        if self.inner.registry.activate(&self.inner.workspace)? {
            tracing::debug!(
                workflow_id = %self.inner.id,
                workspace = %self.inner.workspace.display(),
                "Workflow entered"
            );
        }
        Ok(())
    }

    /// Run `body` inside a [`WorkflowScope`], closing the workflow afterwards.
    ///
    /// Cleanup also runs if the returned future is dropped before completion.
    pub async fn scoped<F, Fut, T>(options: WorkflowOptions, body: F) -> GisflowResult<T>
    where
        F: FnOnce(Workflow) -> Fut,
        Fut: Future<Output = GisflowResult<T>>,
    {
        let scope = WorkflowScope::enter(options)?;
        let result = body(scope.workflow().clone()).await;
        let report = scope.close();
        if let Err(e) = &result {
            tracing::debug!(error = %e, removed = report.removed, "Scoped workflow failed, temp files purged");
        }
        result
    }

    pub fn id(&self) -> WorkflowId {
        self.inner.id
    }

    pub fn options(&self) -> &WorkflowOptions {
        &self.inner.options
    }

    /// Directory holding every owned file of this workflow.
    pub fn workspace_dir(&self) -> &Path {
        &self.inner.workspace
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.registry.state()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Reserve a fresh, uniquely named location owned by this workflow.
    ///
    /// The path is registered before it is returned; the file is not created.
    pub fn acquire(&self, hint: PathHint) -> GisflowResult<FileHandle> {
        let entry = self
            .inner
            .registry
            .reserve(&self.inner.workspace, &hint)
            .inspect_err(|e| {
                tracing::debug!(workflow_id = %self.inner.id, error = %e, "Acquire rejected");
            })?;

        self.inner.metrics.files_acquired.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            workflow_id = %self.inner.id,
            seq = entry.seq,
            path = %entry.path.display(),
            "Acquired temp location"
        );

        Ok(FileHandle::new(entry.path, true, self.clone()))
    }

    /// Register an existing file the workflow must never delete.
    ///
    /// A path this workflow already handed out (possibly spelled through the
    /// canonical workspace path) resolves to the existing entry and keeps its
    /// ownership.
    pub fn adopt(&self, path: impl Into<PathBuf>) -> GisflowResult<FileHandle> {
        let path = self.workspace_relative(path.into());
        let entry = self.inner.registry.adopt(path)?;
        tracing::trace!(
            workflow_id = %self.inner.id,
            seq = entry.seq,
            path = %entry.path.display(),
            owned = entry.owned,
            "Adopted file"
        );
        Ok(FileHandle::new(entry.path, entry.owned, self.clone()))
    }

    /// Rewrite a canonicalized path under the workspace to the workspace's
    /// own spelling, so registry lookups compare like with like.
    fn workspace_relative(&self, path: PathBuf) -> PathBuf {
        if path.starts_with(&self.inner.workspace) {
            return path;
        }
        let Ok(canonical) = std::fs::canonicalize(&self.inner.workspace) else {
            return path;
        };
        match path.strip_prefix(&canonical) {
            Ok(rest) => self.inner.workspace.join(rest),
            Err(_) => path,
        }
    }

    /// Copy a produced file out of the workspace so it survives cleanup.
    pub async fn export(&self, handle: &FileHandle, destination: impl AsRef<Path>) -> GisflowResult<PathBuf> {
        if !handle.workflow().same(self) {
            return Err(GisflowError::InvalidArgument(format!(
                "{} does not belong to workflow {}",
                handle.path().display(),
                self.inner.id
            )));
        }

        let destination = destination.as_ref().to_path_buf();
        if destination.starts_with(&self.inner.workspace) {
            return Err(GisflowError::InvalidArgument(format!(
                "export destination {} is inside the workspace",
                destination.display()
            )));
        }

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::copy(handle.path(), &destination).await.map_err(|e| {
            GisflowError::Storage(format!(
                "Failed to export {} to {}: {}",
                handle.path().display(),
                destination.display(),
                e
            ))
        })?;

        tracing::info!(
            workflow_id = %self.inner.id,
            from = %handle.path().display(),
            to = %destination.display(),
            "Exported file"
        );
        Ok(destination)
    }

    /// Active → Closed. Deletes owned files in reverse acquisition order.
    ///
    /// Idempotent: later calls return an empty report. Deletion errors are
    /// logged and reported, never raised.
    pub fn close(&self) -> CleanupReport {
        let Some(entries) = self.inner.registry.close() else {
            return CleanupReport::default();
        };

        let id = self.inner.id.to_string();
        let report = cleanup::purge(&id, &self.inner.workspace, entries);

        self.inner
            .metrics
            .files_purged
            .fetch_add(report.removed as u64, Ordering::Relaxed);
        self.inner
            .metrics
            .purge_errors
            .fetch_add(report.failed.len() as u64, Ordering::Relaxed);

        tracing::debug!(
            workflow_id = %id,
            removed = report.removed,
            missing = report.missing,
            skipped_unowned = report.skipped_unowned,
            failed = report.failed.len(),
            "Workflow closed"
        );
        report
    }

    /// Snapshot of registered entries, in acquisition order.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.inner.registry.entries()
    }

    pub fn metrics(&self) -> WorkflowMetrics {
        self.inner.metrics.snapshot()
    }

    /// Whether two handles refer to the same workflow context.
    pub fn same(&self, other: &Workflow) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn record_step(&self, success: bool) {
        self.inner.metrics.record_step(success);
    }

    pub(crate) fn record_source(&self) {
        self.inner.metrics.sources_opened.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.inner.id)
            .field("workspace", &self.inner.workspace)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for WorkflowInner {
    /// Last clone gone while still Active: purge so nothing leaks.
    fn drop(&mut self) {
        if !self.registry.state().is_active() {
            return;
        }
        let Some(entries) = self.registry.close() else {
            return;
        };
        let id = self.id.to_string();
        let report = cleanup::purge(&id, &self.workspace, entries);
        tracing::warn!(
            workflow_id = %id,
            removed = report.removed,
            failed = report.failed.len(),
            "Workflow dropped while active, temp files purged"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options_in(root: &Path) -> WorkflowOptions {
        WorkflowOptions::default().with_temp_root(root)
    }

    #[test]
    fn test_new_workflow_is_idle_and_lazy() {
        let dir = tempdir().unwrap();
        let wf = Workflow::new(options_in(dir.path())).unwrap();
        assert_eq!(wf.state(), LifecycleState::Idle);
        assert!(!wf.workspace_dir().exists());
        assert!(wf.workspace_dir().starts_with(dir.path()));
    }

    #[test]
    fn test_acquire_before_enter_fails() {
        let dir = tempdir().unwrap();
        let wf = Workflow::new(options_in(dir.path())).unwrap();
        let err = wf.acquire(PathHint::new()).unwrap_err();
        assert!(err.is_context_closed());
    }

    #[test]
    fn test_enter_acquire_close() {
        let dir = tempdir().unwrap();
        let wf = Workflow::new(options_in(dir.path())).unwrap();
        wf.enter().unwrap();
        assert!(wf.workspace_dir().is_dir());

        let handle = wf.acquire(PathHint::new().extension("tif")).unwrap();
        assert!(handle.is_owned());
        std::fs::write(handle.path(), b"raster").unwrap();

        let report = wf.close();
        assert_eq!(report.removed, 1);
        assert!(!handle.exists());
        assert!(!wf.workspace_dir().exists());
        assert_eq!(wf.state(), LifecycleState::Closed);
        assert_eq!(wf.metrics().files_purged, 1);
    }

    #[test]
    fn test_acquire_after_close_has_no_side_effects() {
        let dir = tempdir().unwrap();
        let wf = Workflow::new(options_in(dir.path())).unwrap();
        wf.enter().unwrap();
        wf.close();

        let before: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        let err = wf.acquire(PathHint::new()).unwrap_err();
        let after: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();

        assert!(err.is_context_closed());
        assert_eq!(before.len(), after.len());
        assert!(wf.adopt("/tmp/whatever.tif").is_err());
        assert!(wf.enter().is_err());
    }

    #[test]
    fn test_close_twice_is_noop() {
        let dir = tempdir().unwrap();
        let wf = Workflow::new(options_in(dir.path())).unwrap();
        wf.enter().unwrap();
        wf.acquire(PathHint::new()).unwrap();
        let first = wf.close();
        let second = wf.close();
        assert_eq!(first.missing, 1);
        assert_eq!(second.missing, 0);
        assert_eq!(second.removed, 0);
    }

    #[test]
    fn test_dropping_last_clone_purges_active_workflow() {
        let dir = tempdir().unwrap();
        let wf = Workflow::new(options_in(dir.path())).unwrap();
        wf.enter().unwrap();
        let workspace = wf.workspace_dir().to_path_buf();

        let handle = wf.acquire(PathHint::new().extension("tif")).unwrap();
        std::fs::write(handle.path(), b"raster").unwrap();
        let path = handle.path().to_path_buf();
        let other = wf.clone();

        drop(wf);
        assert!(path.exists());
        drop(other);
        assert!(path.exists());
        drop(handle);

        assert!(!path.exists());
        assert!(!workspace.exists());
    }

    #[test]
    fn test_reopened_output_keeps_ownership() {
        let dir = tempdir().unwrap();
        let wf = Workflow::new(options_in(dir.path())).unwrap();
        wf.enter().unwrap();

        let out = wf.acquire(PathHint::new().extension("tif")).unwrap();
        std::fs::write(out.path(), b"raster").unwrap();
        let canonical = std::fs::canonicalize(out.path()).unwrap();

        let reopened = wf.adopt(canonical).unwrap();
        assert!(reopened.is_owned());
        assert_eq!(reopened.path(), out.path());
        assert_eq!(wf.entries().len(), 1);

        let report = wf.close();
        assert_eq!(report.removed, 1);
        assert!(!wf.workspace_dir().exists());
    }

    #[tokio::test]
    async fn test_export_survives_cleanup() {
        let dir = tempdir().unwrap();
        let out_dir = tempdir().unwrap();
        let wf = Workflow::new(options_in(dir.path())).unwrap();
        wf.enter().unwrap();

        let handle = wf.acquire(PathHint::new().extension("tif")).unwrap();
        std::fs::write(handle.path(), b"final").unwrap();
        let dest = wf
            .export(&handle, out_dir.path().join("nested/final.tif"))
            .await
            .unwrap();

        wf.close();
        assert!(!handle.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"final");
    }

    #[tokio::test]
    async fn test_export_rejects_foreign_handle() {
        let dir = tempdir().unwrap();
        let a = Workflow::new(options_in(dir.path())).unwrap();
        let b = Workflow::new(options_in(dir.path())).unwrap();
        a.enter().unwrap();
        b.enter().unwrap();

        let handle = a.acquire(PathHint::new()).unwrap();
        std::fs::write(handle.path(), b"x").unwrap();
        let err = b.export(&handle, dir.path().join("out.bin")).await.unwrap_err();
        assert!(matches!(err, GisflowError::InvalidArgument(_)));

        a.close();
        b.close();
    }
}
