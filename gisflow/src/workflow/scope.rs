//! RAII guard that closes a workflow on every exit path.

use super::{CleanupReport, Workflow};
use crate::options::WorkflowOptions;
use gisflow_shared::errors::GisflowResult;
use std::ops::Deref;

/// Entered workflow that is closed when the guard goes out of scope.
///
/// Covers normal return, `?` early exits, panics and cancellation of the
/// enclosing future. Clones of the inner [`Workflow`] may outlive the guard,
/// but every acquisition through them fails with `ContextClosed` afterwards.
pub struct WorkflowScope {
    workflow: Workflow,
    armed: bool,
}

impl WorkflowScope {
    /// Create and enter a new workflow.
    pub fn enter(options: WorkflowOptions) -> GisflowResult<Self> {
        let workflow = Workflow::new(options)?;
        workflow.enter()?;
        Ok(Self {
            workflow,
            armed: true,
        })
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Close explicitly and return the cleanup report.
    pub fn close(mut self) -> CleanupReport {
        self.armed = false;
        self.workflow.close()
    }
}

impl Deref for WorkflowScope {
    type Target = Workflow;

    fn deref(&self) -> &Workflow {
        &self.workflow
    }
}

impl Drop for WorkflowScope {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let report = self.workflow.close();
        if std::thread::panicking() {
            tracing::warn!(
                workflow_id = %self.workflow.id(),
                removed = report.removed,
                "Workflow closed during panic"
            );
        } else {
            tracing::debug!(
                workflow_id = %self.workflow.id(),
                removed = report.removed,
                "Workflow closed on drop"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::PathHint;
    use tempfile::tempdir;

    #[test]
    fn test_drop_purges() {
        let dir = tempdir().unwrap();
        let (path, workspace) = {
            let scope = WorkflowScope::enter(WorkflowOptions::default().with_temp_root(dir.path()))
                .unwrap();
            let handle = scope.acquire(PathHint::new()).unwrap();
            std::fs::write(handle.path(), b"tmp").unwrap();
            (handle.path().to_path_buf(), scope.workspace_dir().to_path_buf())
        };
        assert!(!path.exists());
        assert!(!workspace.exists());
    }

    #[test]
    fn test_drop_after_panic_purges() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let outcome = std::panic::catch_unwind(move || {
            let scope =
                WorkflowScope::enter(WorkflowOptions::default().with_temp_root(&root)).unwrap();
            let handle = scope.acquire(PathHint::new()).unwrap();
            std::fs::write(handle.path(), b"tmp").unwrap();
            panic!("operation blew up");
        });

        assert!(outcome.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_outliving_clone_cannot_acquire() {
        let dir = tempdir().unwrap();
        let scope =
            WorkflowScope::enter(WorkflowOptions::default().with_temp_root(dir.path())).unwrap();
        let escaped = scope.workflow().clone();
        drop(scope);

        assert!(escaped.acquire(PathHint::new()).unwrap_err().is_context_closed());
    }
}
