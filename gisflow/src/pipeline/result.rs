//! Execution results and their provenance.

use super::metrics::StepMetrics;
use crate::workflow::FileHandle;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

/// What fed a composition step. Kept for tracing and debugging only;
/// cleanup order never depends on it.
#[derive(Debug, Clone)]
pub enum Upstream {
    Source(FileHandle),
    Step(ExecutionResult),
    /// Inputs of an N-ary composition, in positional order.
    Many(Vec<Upstream>),
}

/// Output of one successful composition step.
///
/// Cheap to clone. Can be the left side of further compositions.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    output: FileHandle,
    metrics: StepMetrics,
    finished_at: DateTime<Utc>,
    upstream: Arc<Upstream>,
}

impl ExecutionResult {
    pub(crate) fn new(output: FileHandle, metrics: StepMetrics, upstream: Upstream) -> Self {
        Self {
            output,
            metrics,
            finished_at: Utc::now(),
            upstream: Arc::new(upstream),
        }
    }

    pub fn output(&self) -> &FileHandle {
        &self.output
    }

    pub fn path(&self) -> &Path {
        self.output.path()
    }

    /// Command that produced this output.
    pub fn command(&self) -> &str {
        &self.metrics.command
    }

    pub fn metrics(&self) -> &StepMetrics {
        &self.metrics
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Commands from the chain's source to this result, depth first.
    pub fn lineage(&self) -> Vec<String> {
        let mut commands = Vec::new();
        collect_lineage(&self.upstream, &mut commands);
        commands.push(self.metrics.command.clone());
        commands
    }

    /// Source handles this result ultimately derives from.
    pub fn sources(&self) -> Vec<FileHandle> {
        let mut sources = Vec::new();
        collect_sources(&self.upstream, &mut sources);
        sources
    }
}

fn collect_lineage(upstream: &Upstream, commands: &mut Vec<String>) {
    match upstream {
        Upstream::Source(_) => {}
        Upstream::Step(result) => {
            collect_lineage(&result.upstream, commands);
            commands.push(result.metrics.command.clone());
        }
        Upstream::Many(items) => {
            for item in items {
                collect_lineage(item, commands);
            }
        }
    }
}

fn collect_sources(upstream: &Upstream, sources: &mut Vec<FileHandle>) {
    match upstream {
        Upstream::Source(handle) => sources.push(handle.clone()),
        Upstream::Step(result) => collect_sources(&result.upstream, sources),
        Upstream::Many(items) => {
            for item in items {
                collect_sources(item, sources);
            }
        }
    }
}

/// Anything usable as the left side of a composition.
pub trait Composable: Send + Sync {
    /// The file the next step reads.
    fn output_handle(&self) -> &FileHandle;

    /// Provenance recorded on the next step's result.
    fn to_upstream(&self) -> Upstream;
}

impl Composable for FileHandle {
    fn output_handle(&self) -> &FileHandle {
        self
    }

    fn to_upstream(&self) -> Upstream {
        Upstream::Source(self.clone())
    }
}

impl Composable for ExecutionResult {
    fn output_handle(&self) -> &FileHandle {
        &self.output
    }

    fn to_upstream(&self) -> Upstream {
        Upstream::Step(self.clone())
    }
}
