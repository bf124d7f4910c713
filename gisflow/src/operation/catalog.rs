//! JSON catalogs of named unit operations.
//!
//! ```json
//! {
//!   "to_byte": {
//!     "command": "gdal_translate",
//!     "options": { "ot": "Byte", "b": 1, "of": "GTiff", "co": ["NUM_THREADS=ALL_CPUS"] },
//!     "output_extension": "tif"
//!   },
//!   "relief": {
//!     "command": "gdaldem",
//!     "leading_args": ["color-relief"],
//!     "trailing_args": ["ramp.txt"]
//!   }
//! }
//! ```
//!
//! Option order in the file is preserved in the rendered command line.

use super::{ArgStyle, OptionValue, UnitOperation};
use gisflow_shared::errors::{GisflowError, GisflowResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Serialized form of a [`UnitOperation`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationSpec {
    pub command: String,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
    /// One of `dash`, `double_dash`, `key_value`, `dash_key_value`.
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub leading_args: Vec<String>,
    #[serde(default)]
    pub trailing_args: Vec<String>,
    #[serde(default)]
    pub output_extension: Option<String>,
    #[serde(default)]
    pub output_name: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl OperationSpec {
    pub fn build(&self) -> GisflowResult<UnitOperation> {
        let mut builder = UnitOperation::builder(&self.command);

        if let Some(style) = &self.style {
            builder = builder.style(ArgStyle::from_name(style)?);
        }
        for (name, value) in &self.options {
            let value = OptionValue::try_from(value.clone()).map_err(|e| {
                GisflowError::Config(format!("option '{}' of {}: {}", name, self.command, e))
            })?;
            builder = builder.option(name.clone(), value);
        }
        for arg in &self.leading_args {
            builder = builder.leading_arg(arg.clone());
        }
        for arg in &self.trailing_args {
            builder = builder.trailing_arg(arg.clone());
        }
        if let Some(ext) = &self.output_extension {
            builder = builder.output_extension(ext.clone());
        }
        if let Some(name) = &self.output_name {
            builder = builder.output_name(name.clone());
        }
        for (key, value) in &self.env {
            builder = builder.env(key.clone(), value.clone());
        }
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        Ok(builder.build())
    }
}

/// Named operations loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct OperationCatalog {
    operations: BTreeMap<String, UnitOperation>,
}

impl OperationCatalog {
    pub fn from_json_str(json: &str) -> GisflowResult<Self> {
        let specs: BTreeMap<String, OperationSpec> = serde_json::from_str(json)
            .map_err(|e| GisflowError::Config(format!("invalid operation catalog: {}", e)))?;

        let mut operations = BTreeMap::new();
        for (name, spec) in specs {
            let op = spec.build()?;
            tracing::trace!(name = %name, operation = %op, "Loaded operation");
            operations.insert(name, op);
        }
        Ok(Self { operations })
    }

    pub fn load(path: impl AsRef<Path>) -> GisflowResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            GisflowError::Config(format!(
                "Failed to read operation catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    pub fn get(&self, name: &str) -> Option<&UnitOperation> {
        self.operations.get(name)
    }

    /// Like [`get`](Self::get), but a missing name is a configuration error.
    pub fn require(&self, name: &str) -> GisflowResult<UnitOperation> {
        self.operations
            .get(name)
            .cloned()
            .ok_or_else(|| GisflowError::Config(format!("operation '{}' not in catalog", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
