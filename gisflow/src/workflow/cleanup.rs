//! Purge of registered files on workflow exit.

use super::registry::RegistryEntry;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Outcome of closing a workflow.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Owned paths deleted.
    pub removed: usize,
    /// Owned paths that no longer existed (never written, or removed already).
    pub missing: usize,
    /// Unowned paths left in place.
    pub skipped_unowned: usize,
    /// Deletions that failed for reasons other than absence.
    pub failed: Vec<(PathBuf, String)>,
    pub workspace_removed: bool,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete owned entries in reverse acquisition order, then the workspace.
///
/// Never returns an error: every failure is logged and recorded in the report.
pub(crate) fn purge(workflow_id: &str, workspace: &Path, entries: Vec<RegistryEntry>) -> CleanupReport {
    let mut report = CleanupReport::default();
    let owned: HashSet<&Path> = entries
        .iter()
        .filter(|e| e.owned)
        .map(|e| e.path.as_path())
        .collect();
    let mut shelters_unowned = false;

    for entry in entries.iter().rev() {
        if !entry.owned {
            report.skipped_unowned += 1;
            // A workflow output reopened as a plain source is still ours.
            if entry.path.starts_with(workspace) && !owned.contains(entry.path.as_path()) {
                shelters_unowned = true;
            }
            continue;
        }

        match remove_path(&entry.path) {
            Ok(()) => {
                tracing::trace!(workflow_id, seq = entry.seq, path = %entry.path.display(), "Removed temp file");
                report.removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(workflow_id, seq = entry.seq, path = %entry.path.display(), "Temp file already gone");
                report.missing += 1;
            }
            Err(e) => {
                tracing::warn!(
                    workflow_id,
                    path = %entry.path.display(),
                    error = %e,
                    "Failed to remove temp file"
                );
                report.failed.push((entry.path.clone(), e.to_string()));
            }
        }
    }

    if shelters_unowned {
        tracing::warn!(
            workflow_id,
            workspace = %workspace.display(),
            "Workspace holds an unowned file, leaving directory in place"
        );
        return report;
    }

    // Tools commonly leave sidecars (e.g. `.aux.xml`) next to their outputs,
    // so the workspace goes recursively.
    match std::fs::remove_dir_all(workspace) {
        Ok(()) => report.workspace_removed = true,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(workflow_id, workspace = %workspace.display(), "Workspace already gone");
        }
        Err(e) => {
            tracing::warn!(
                workflow_id,
                workspace = %workspace.display(),
                error = %e,
                "Failed to remove workspace directory"
            );
            report.failed.push((workspace.to_path_buf(), e.to_string()));
        }
    }

    report
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
