//! Composition of unit operations into pipelines.
//!
//! A composition step runs one [`UnitOperation`](crate::operation::UnitOperation)
//! on the output of its left-hand side and writes a fresh temp file owned by
//! the same workflow. The left side is either a source [`FileHandle`](crate::workflow::FileHandle)
//! or a previous [`ExecutionResult`], so steps chain naturally.
//!
//! ## Architecture
//!
//! ```text
//! FileSource ─► FileHandle ─compose(op1)─► ExecutionResult ─compose(op2)─► ExecutionResult
//!                    │
//!                    └──────────compose(op3)─► ExecutionResult      (fan-out)
//!
//! - compose:   one step, output path registered before the command starts
//! - Chain:     ordered steps, stops at the first failure
//! - fan_out:   several chains over one input, parallel or sequential
//! ```
//!
//! ## Example
//!
//! ```ignore
//! let to_byte = UnitOperation::new("gdal_translate", [("ot", "Byte"), ("of", "GTiff")]);
//! let to_u16 = UnitOperation::new("gdal_translate", [("ot", "UInt16")]);
//!
//! Workflow::scoped(WorkflowOptions::default(), |wf| async move {
//!     let dem = FileSource::new(&wf).open("/data/dem.tif").await?;
//!     let byte = dem.then(&to_byte).await?;
//!     let relief = byte.then(&relief).await?;
//!     wf.export(relief.output(), "/out/relief.tif").await?;
//!     Ok(())
//! })
//! .await?;
//! ```

mod chain;
mod compose;
mod metrics;
mod result;

pub use chain::{Chain, ChainOutcome, ExecutionMode, FanOut, fan_out};
pub use compose::{compose, compose_many};
pub use metrics::{ChainMetrics, FanOutMetrics, StepMetrics};
pub use result::{Composable, ExecutionResult, Upstream};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{CommandRunner, Invocation, RunOutput, UnitOperation};
    use crate::options::WorkflowOptions;
    use crate::workflow::{FileHandle, PathHint, Workflow};
    use async_trait::async_trait;
    use gisflow_shared::errors::{ExitStatusCode, GisflowError, GisflowResult};
    use parking_lot::Mutex;
    use std::ffi::OsString;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Concatenates every input into the output and records the argv.
    #[derive(Default)]
    struct ConcatRunner {
        calls: Mutex<Vec<Vec<OsString>>>,
    }

    #[async_trait]
    impl CommandRunner for ConcatRunner {
        async fn run(&self, invocation: &Invocation) -> GisflowResult<RunOutput> {
            self.calls.lock().push(invocation.args.clone());
            let (output, inputs) = invocation.args.split_last().unwrap();
            let mut bytes = Vec::new();
            for input in inputs.iter().filter(|a| Path::new(a).is_file()) {
                bytes.extend(std::fs::read(input)?);
            }
            std::fs::write(output, bytes)?;
            Ok(RunOutput::default())
        }

        fn name(&self) -> &str {
            "concat"
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl CommandRunner for FailingRunner {
        async fn run(&self, invocation: &Invocation) -> GisflowResult<RunOutput> {
            Err(GisflowError::ExternalProcessFailure {
                command: invocation.command.clone(),
                status: ExitStatusCode(Some(1)),
                diagnostics: "ERROR 4: not recognized as a supported file format".into(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn active_workflow(root: &Path) -> Workflow {
        let wf = Workflow::new(WorkflowOptions::default().with_temp_root(root)).unwrap();
        wf.enter().unwrap();
        wf
    }

    fn source_file(wf: &Workflow, contents: &[u8]) -> FileHandle {
        let handle = wf
            .acquire(PathHint::new().file_name("dem.tif"))
            .unwrap();
        std::fs::write(handle.path(), contents).unwrap();
        handle
    }

    fn op(command: &str, runner: Arc<dyn CommandRunner>) -> UnitOperation {
        UnitOperation::builder(command)
            .option("ot", "Byte")
            .runner(runner)
            .build()
    }

    #[tokio::test]
    async fn test_compose_writes_fresh_output() {
        let dir = tempdir().unwrap();
        let wf = active_workflow(dir.path());
        let src = source_file(&wf, b"raster");
        let runner = Arc::new(ConcatRunner::default());

        let result = compose(&src, &op("gdal_translate", runner.clone())).await.unwrap();

        assert_ne!(result.path(), src.path());
        assert!(result.path().starts_with(wf.workspace_dir()));
        assert_eq!(result.path().extension().unwrap(), "tif");
        assert_eq!(std::fs::read(result.path()).unwrap(), b"raster");
        assert_eq!(result.command(), "gdal_translate");
        assert_eq!(result.sources(), vec![src.clone()]);

        let calls = runner.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][..2], [OsString::from("-ot"), OsString::from("Byte")]);
        assert_eq!(wf.metrics().steps_succeeded, 1);
    }

    #[tokio::test]
    async fn test_then_chains_and_tracks_lineage() {
        let dir = tempdir().unwrap();
        let wf = active_workflow(dir.path());
        let src = source_file(&wf, b"abc");
        let runner: Arc<dyn CommandRunner> = Arc::new(ConcatRunner::default());

        let first = src.then(&op("gdal_translate", runner.clone())).await.unwrap();
        let second = first.then(&op("gdaldem", runner)).await.unwrap();

        assert_ne!(first.path(), second.path());
        assert_eq!(second.lineage(), vec!["gdal_translate", "gdaldem"]);
        assert_eq!(second.sources(), vec![src]);
    }

    #[tokio::test]
    async fn test_failed_step_output_is_registered() {
        let dir = tempdir().unwrap();
        let wf = active_workflow(dir.path());
        let src = source_file(&wf, b"abc");
        let before = wf.entries().len();

        let err = compose(&src, &op("gdal_translate", Arc::new(FailingRunner)))
            .await
            .unwrap_err();

        assert!(err.is_external_failure());
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(wf.entries().len(), before + 1);
        assert_eq!(wf.metrics().steps_failed, 1);

        let report = wf.close();
        assert!(report.is_clean());
        assert!(!wf.workspace_dir().exists());
    }

    #[tokio::test]
    async fn test_compose_on_closed_workflow() {
        let dir = tempdir().unwrap();
        let wf = active_workflow(dir.path());
        let src = source_file(&wf, b"abc");
        wf.close();

        let err = compose(&src, &op("gdal_translate", Arc::new(ConcatRunner::default())))
            .await
            .unwrap_err();
        assert!(err.is_context_closed());
    }

    #[tokio::test]
    async fn test_compose_many_passes_inputs_in_order() {
        let dir = tempdir().unwrap();
        let wf = active_workflow(dir.path());
        let a = source_file(&wf, b"north");
        let b = source_file(&wf, b"south");
        let merge = UnitOperation::builder("gdal_merge.py")
            .runner(Arc::new(ConcatRunner::default()))
            .build();

        let merged = compose_many(&[&a, &b], &merge).await.unwrap();
        assert_eq!(std::fs::read(merged.path()).unwrap(), b"northsouth");
        assert_eq!(merged.sources(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_compose_many_rejects_mixed_workflows() {
        let dir = tempdir().unwrap();
        let wf1 = active_workflow(dir.path());
        let wf2 = active_workflow(dir.path());
        let a = source_file(&wf1, b"a");
        let b = source_file(&wf2, b"b");
        let merge = UnitOperation::builder("gdal_merge.py")
            .runner(Arc::new(ConcatRunner::default()))
            .build();

        let err = compose_many(&[&a, &b], &merge).await.unwrap_err();
        assert!(matches!(err, GisflowError::InvalidArgument(_)));
        assert!(compose_many(&[], &merge).await.is_err());
    }

    #[tokio::test]
    async fn test_chain_run_collects_metrics() {
        let dir = tempdir().unwrap();
        let wf = active_workflow(dir.path());
        let src = source_file(&wf, b"abc");
        let runner: Arc<dyn CommandRunner> = Arc::new(ConcatRunner::default());

        let chain = Chain::new()
            .then(op("gdal_translate", runner.clone()))
            .then(op("gdalwarp", runner.clone()))
            .then(op("gdaldem", runner));
        let outcome = chain.run(&src).await.unwrap();

        assert_eq!(outcome.metrics.steps.len(), 3);
        assert!(outcome.metrics.step_duration_ms("gdalwarp").is_some());
        assert_eq!(outcome.result.lineage(), vec!["gdal_translate", "gdalwarp", "gdaldem"]);
    }

    #[tokio::test]
    async fn test_empty_chain_rejected() {
        let dir = tempdir().unwrap();
        let wf = active_workflow(dir.path());
        let src = source_file(&wf, b"abc");
        assert!(Chain::new().run(&src).await.is_err());
    }

    #[tokio::test]
    async fn test_fan_out_isolates_failures() {
        let dir = tempdir().unwrap();
        let wf = active_workflow(dir.path());
        let src = source_file(&wf, b"abc");
        let good: Arc<dyn CommandRunner> = Arc::new(ConcatRunner::default());

        let chains = vec![
            Chain::new().then(op("gdal_translate", good.clone())),
            Chain::new().then(op("gdal_translate", Arc::new(FailingRunner))),
            Chain::new().then(op("gdal_translate", good)),
        ];

        for mode in [ExecutionMode::Parallel, ExecutionMode::Sequential] {
            let fan = fan_out(&src, &chains, mode).await;
            assert_eq!(fan.metrics.execution, mode);
            assert_eq!(fan.metrics.succeeded, 2);
            assert_eq!(fan.metrics.failed, 1);
            assert!(fan.first_error().unwrap().is_external_failure());

            let ok: Vec<_> = fan.outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
            assert_ne!(ok[0].result.path(), ok[1].result.path());
        }
    }

    #[tokio::test]
    async fn test_output_name_is_kept_and_unique() {
        let dir = tempdir().unwrap();
        let wf = active_workflow(dir.path());
        let src = source_file(&wf, b"abc");
        let relief = UnitOperation::builder("gdaldem")
            .leading_arg("color-relief")
            .output_name("relief.png")
            .runner(Arc::new(ConcatRunner::default()))
            .build();

        let first = src.then(&relief).await.unwrap();
        let second = src.then(&relief).await.unwrap();

        assert_ne!(first.path(), second.path());
        for result in [&first, &second] {
            let name = result.output().file_name().unwrap();
            assert!(name.ends_with("-relief.png"), "unexpected name {name}");
        }
    }
}
