//! The composition operator.

use super::metrics::StepMetrics;
use super::result::{Composable, ExecutionResult, Upstream};
use crate::operation::UnitOperation;
use crate::workflow::{FileHandle, PathHint};
use gisflow_shared::errors::{GisflowError, GisflowResult};
use std::time::Instant;

/// Run `operation` on the output of `left`, writing a fresh temp file.
///
/// The output location is registered with the input's workflow before the
/// command starts, so it is purged on exit even if the command fails or the
/// future is dropped mid-run.
pub async fn compose<L>(left: &L, operation: &UnitOperation) -> GisflowResult<ExecutionResult>
where
    L: Composable + ?Sized,
{
    let input = left.output_handle();
    let output = input.workflow().acquire(output_hint(operation, &[input]))?;

    run_step(operation, &[input], output, left.to_upstream()).await
}

/// N-ary composition: all outputs of `inputs` become positional inputs, in order.
///
/// Every input must belong to the same workflow. Merge semantics beyond
/// positional order are left to the operation itself.
pub async fn compose_many(
    inputs: &[&dyn Composable],
    operation: &UnitOperation,
) -> GisflowResult<ExecutionResult> {
    let Some(first) = inputs.first() else {
        return Err(GisflowError::InvalidArgument(format!(
            "{} needs at least one input",
            operation.command()
        )));
    };

    let workflow = first.output_handle().workflow();
    let handles: Vec<&FileHandle> = inputs.iter().map(|i| i.output_handle()).collect();
    if handles.iter().any(|h| !h.workflow().same(workflow)) {
        return Err(GisflowError::InvalidArgument(
            "inputs of one composition must belong to the same workflow".into(),
        ));
    }

    let output = workflow.acquire(output_hint(operation, &handles))?;
    let upstream = Upstream::Many(inputs.iter().map(|i| i.to_upstream()).collect());

    run_step(operation, &handles, output, upstream).await
}

async fn run_step(
    operation: &UnitOperation,
    inputs: &[&FileHandle],
    output: FileHandle,
    upstream: Upstream,
) -> GisflowResult<ExecutionResult> {
    let workflow = output.workflow().clone();
    let start = Instant::now();

    let outcome = operation.invoke(inputs, &output).await;
    let duration_ms = start.elapsed().as_millis();
    workflow.record_step(outcome.is_ok());

    match outcome {
        Ok(_) => {
            if !output.exists() {
                tracing::warn!(
                    workflow_id = %workflow.id(),
                    command = operation.command(),
                    output = %output.path().display(),
                    "Command succeeded without writing its output"
                );
            }
            tracing::debug!(
                workflow_id = %workflow.id(),
                command = operation.command(),
                output = %output.path().display(),
                duration_ms = duration_ms as u64,
                "Composition step finished"
            );
            let metrics = StepMetrics {
                command: operation.command().to_string(),
                duration_ms,
            };
            Ok(ExecutionResult::new(output, metrics, upstream))
        }
        Err(e) => {
            // Output stays registered; the workflow purges it on close.
            tracing::warn!(
                workflow_id = %workflow.id(),
                command = operation.command(),
                error = %e,
                "Composition step failed"
            );
            Err(e)
        }
    }
}

fn output_hint(operation: &UnitOperation, inputs: &[&FileHandle]) -> PathHint {
    if let Some(name) = operation.output_name() {
        return PathHint::new().file_name(name);
    }

    let hint = PathHint::new().label(operation.label());
    let ext = operation
        .output_extension()
        .or_else(|| inputs.first().and_then(|h| h.extension()));
    match ext {
        Some(ext) => hint.extension(ext),
        None => hint,
    }
}

impl FileHandle {
    /// Fluent form of [`compose`]: `source.then(&op).await`.
    pub async fn then(&self, operation: &UnitOperation) -> GisflowResult<ExecutionResult> {
        compose(self, operation).await
    }
}

impl ExecutionResult {
    /// Fluent form of [`compose`]: `result.then(&op).await`.
    pub async fn then(&self, operation: &UnitOperation) -> GisflowResult<ExecutionResult> {
        compose(self, operation).await
    }
}
