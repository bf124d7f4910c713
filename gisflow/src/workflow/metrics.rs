//! Workflow-wide counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by acquisitions, steps and cleanup.
#[derive(Debug, Default)]
pub(crate) struct WorkflowMetricsStorage {
    pub(crate) files_acquired: AtomicU64,
    pub(crate) sources_opened: AtomicU64,
    pub(crate) steps_succeeded: AtomicU64,
    pub(crate) steps_failed: AtomicU64,
    pub(crate) files_purged: AtomicU64,
    pub(crate) purge_errors: AtomicU64,
}

impl WorkflowMetricsStorage {
    pub(crate) fn record_step(&self, success: bool) {
        if success {
            self.steps_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.steps_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> WorkflowMetrics {
        WorkflowMetrics {
            files_acquired: self.files_acquired.load(Ordering::Relaxed),
            sources_opened: self.sources_opened.load(Ordering::Relaxed),
            steps_succeeded: self.steps_succeeded.load(Ordering::Relaxed),
            steps_failed: self.steps_failed.load(Ordering::Relaxed),
            files_purged: self.files_purged.load(Ordering::Relaxed),
            purge_errors: self.purge_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a workflow's counters. Counters never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowMetrics {
    pub files_acquired: u64,
    pub sources_opened: u64,
    pub steps_succeeded: u64,
    pub steps_failed: u64,
    pub files_purged: u64,
    pub purge_errors: u64,
}
