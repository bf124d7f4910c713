//! Multi-step chains and fan-out over a shared input.

use super::compose::compose;
use super::metrics::{ChainMetrics, FanOutMetrics};
use super::result::{Composable, ExecutionResult};
use crate::operation::UnitOperation;
use gisflow_shared::errors::{GisflowError, GisflowResult};
use futures::future::join_all;
use std::time::Instant;

/// Execution mode for a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run all chains concurrently on the current task.
    Parallel,
    /// Run chains one after another, in order.
    Sequential,
}

/// An ordered list of operations applied left to right.
///
/// `Chain::new().then(a).then(b).run(&source)` is the same as
/// `compose(&compose(&source, &a).await?, &b).await`.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    steps: Vec<UnitOperation>,
}

/// Final result of a chain plus per-step timings.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub result: ExecutionResult,
    pub metrics: ChainMetrics,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, operation: UnitOperation) -> Self {
        self.steps.push(operation);
        self
    }

    pub fn push(&mut self, operation: UnitOperation) {
        self.steps.push(operation);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[UnitOperation] {
        &self.steps
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// Intermediates written before a failure stay registered with the
    /// workflow and are purged when it closes.
    pub async fn run<L>(&self, source: &L) -> GisflowResult<ChainOutcome>
    where
        L: Composable + ?Sized,
    {
        let (first, rest) = self
            .steps
            .split_first()
            .ok_or_else(|| GisflowError::InvalidArgument("chain has no steps".into()))?;

        let total_start = Instant::now();
        let mut result = compose(source, first).await?;
        let mut steps = vec![result.metrics().clone()];

        for operation in rest {
            result = compose(&result, operation).await?;
            steps.push(result.metrics().clone());
        }

        Ok(ChainOutcome {
            result,
            metrics: ChainMetrics {
                total_duration_ms: total_start.elapsed().as_millis(),
                steps,
            },
        })
    }
}

impl FromIterator<UnitOperation> for Chain {
    fn from_iter<I: IntoIterator<Item = UnitOperation>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

/// Results of [`fan_out`], one per chain in input order.
#[derive(Debug)]
pub struct FanOut {
    pub outcomes: Vec<GisflowResult<ChainOutcome>>,
    pub metrics: FanOutMetrics,
}

impl FanOut {
    /// First error, if any chain failed.
    pub fn first_error(&self) -> Option<&GisflowError> {
        self.outcomes.iter().find_map(|o| o.as_ref().err())
    }

    /// Successful outcomes, or the first error.
    pub fn into_results(self) -> GisflowResult<Vec<ChainOutcome>> {
        self.outcomes.into_iter().collect()
    }
}

/// Run several chains on the same input.
///
/// Every chain runs to completion regardless of the others, so one failing
/// branch does not cancel its siblings. Each chain writes its own outputs;
/// the shared input is only read.
pub async fn fan_out<L>(source: &L, chains: &[Chain], execution: ExecutionMode) -> FanOut
where
    L: Composable + ?Sized,
{
    let total_start = Instant::now();

    let outcomes = match execution {
        ExecutionMode::Parallel => join_all(chains.iter().map(|chain| chain.run(source))).await,
        ExecutionMode::Sequential => {
            let mut outcomes = Vec::with_capacity(chains.len());
            for chain in chains {
                outcomes.push(chain.run(source).await);
            }
            outcomes
        }
    };

    let failed = outcomes.iter().filter(|o| o.is_err()).count();
    let metrics = FanOutMetrics {
        execution,
        total_duration_ms: total_start.elapsed().as_millis(),
        succeeded: outcomes.len() - failed,
        failed,
    };

    tracing::debug!(
        workflow_id = %source.output_handle().workflow().id(),
        chains = chains.len(),
        failed,
        duration_ms = metrics.total_duration_ms as u64,
        "Fan-out finished"
    );

    FanOut { outcomes, metrics }
}
