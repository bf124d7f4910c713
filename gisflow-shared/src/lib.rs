//! Shared types for gisflow crates.

pub mod errors;

pub use errors::{ExitStatusCode, GisflowError, GisflowResult};
