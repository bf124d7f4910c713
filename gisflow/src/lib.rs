//! gisflow - chains of external geospatial tools with scoped temp files.
//!
//! Unit operations wrap a command line tool (GDAL, OGR, GRASS...) with a
//! fixed option set. Composing an operation with a file runs the tool and
//! yields a new temp file, which can itself be composed further. Every
//! intermediate lives inside a [`Workflow`] and is deleted when the workflow
//! closes, whether the body returned, failed, panicked or was cancelled.
//!
//! ```ignore
//! let scope = WorkflowScope::enter(WorkflowOptions::from_env())?;
//! let dem = FileSource::new(&scope).open("/data/dem.tif").await?;
//! let result = Chain::new().then(to_byte).then(relief).run(&dem).await?;
//! scope.export(result.result.output(), "/out/relief.tif").await?;
//! ```

mod logging;

pub mod operation;
pub mod options;
pub mod pipeline;
pub mod source;
pub mod workflow;

pub use gisflow_shared::errors::{ExitStatusCode, GisflowError, GisflowResult};
pub use logging::init_logging;
pub use operation::{ArgStyle, OperationCatalog, OptionValue, UnitOperation};
pub use options::{LoggingOptions, WorkflowOptions};
pub use pipeline::{
    Chain, ChainOutcome, Composable, ExecutionMode, ExecutionResult, compose, compose_many, fan_out,
};
pub use source::{FileSource, Origin, RemoteRef};
pub use workflow::{CleanupReport, FileHandle, LifecycleState, PathHint, Workflow, WorkflowScope};
