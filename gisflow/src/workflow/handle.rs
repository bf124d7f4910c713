//! File handles handed out by a workflow.

use super::Workflow;
use std::fmt;
use std::path::{Path, PathBuf};

/// A registered file location.
///
/// Handles are cheap to clone. Dropping a handle never deletes anything; only
/// the owning [`Workflow`] removes owned files, when it closes or when its
/// last clone goes away while still active.
#[derive(Clone)]
pub struct FileHandle {
    path: PathBuf,
    owned: bool,
    workflow: Workflow,
}

impl FileHandle {
    pub(crate) fn new(path: PathBuf, owned: bool, workflow: Workflow) -> Self {
        Self {
            path,
            owned,
            workflow,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the workflow deletes this path on exit.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }
}

impl AsRef<Path> for FileHandle {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("owned", &self.owned)
            .field("workflow_id", &self.workflow.id().to_string())
            .finish()
    }
}

impl PartialEq for FileHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.workflow.same(&other.workflow)
    }
}

impl Eq for FileHandle {}
