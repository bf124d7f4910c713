//! Option values and command-line rendering rules.

use gisflow_shared::errors::{GisflowError, GisflowResult};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Value of a single operation option. Passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub enum OptionValue {
    /// Bare flag when true, omitted when false.
    Switch(bool),
    Text(String),
    /// Repeats the flag once per item (`-co A -co B`).
    List(Vec<String>),
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Text(v)
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Switch(v)
    }
}

macro_rules! option_value_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for OptionValue {
                fn from(v: $t) -> Self {
                    OptionValue::Text(v.to_string())
                }
            }
        )*
    };
}

option_value_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<Vec<String>> for OptionValue {
    fn from(v: Vec<String>) -> Self {
        OptionValue::List(v)
    }
}

impl From<Vec<&str>> for OptionValue {
    fn from(v: Vec<&str>) -> Self {
        OptionValue::List(v.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for OptionValue {
    fn from(v: [&str; N]) -> Self {
        OptionValue::List(v.iter().map(|s| s.to_string()).collect())
    }
}

impl TryFrom<Value> for OptionValue {
    type Error = GisflowError;

    fn try_from(value: Value) -> GisflowResult<Self> {
        match value {
            Value::Bool(b) => Ok(OptionValue::Switch(b)),
            Value::String(s) => Ok(OptionValue::Text(s)),
            Value::Number(n) => Ok(OptionValue::Text(n.to_string())),
            Value::Array(items) => items
                .into_iter()
                .map(scalar_to_string)
                .collect::<GisflowResult<Vec<_>>>()
                .map(OptionValue::List),
            other => Err(GisflowError::Config(format!(
                "unsupported option value: {}",
                other
            ))),
        }
    }
}

fn scalar_to_string(value: Value) -> GisflowResult<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(GisflowError::Config(format!(
            "list option items must be scalars, got: {}",
            other
        ))),
    }
}

/// Custom per-operation rendering: `(name, value) -> argv fragment`.
pub type RenderFn = Arc<dyn Fn(&str, &OptionValue) -> Vec<String> + Send + Sync>;

/// How an option mapping becomes command-line arguments.
#[derive(Clone, Default)]
pub enum ArgStyle {
    /// `-name value` (GDAL utilities).
    #[default]
    Dash,
    /// `--name value`.
    DoubleDash,
    /// `name=value` (creation options, GRASS-style tools).
    KeyValue,
    /// `-name=value`.
    DashKeyValue,
    Custom(RenderFn),
}

impl ArgStyle {
    pub fn custom<F>(render: F) -> Self
    where
        F: Fn(&str, &OptionValue) -> Vec<String> + Send + Sync + 'static,
    {
        ArgStyle::Custom(Arc::new(render))
    }

    /// Parse a style name used in operation catalogs.
    pub fn from_name(name: &str) -> GisflowResult<Self> {
        match name {
            "dash" => Ok(ArgStyle::Dash),
            "double_dash" => Ok(ArgStyle::DoubleDash),
            "key_value" => Ok(ArgStyle::KeyValue),
            "dash_key_value" => Ok(ArgStyle::DashKeyValue),
            other => Err(GisflowError::Config(format!(
                "unknown argument style '{}'",
                other
            ))),
        }
    }

    /// Render one option into its argv fragment.
    pub fn render(&self, name: &str, value: &OptionValue) -> Vec<String> {
        if let ArgStyle::Custom(render) = self {
            return render(name, value);
        }

        match value {
            OptionValue::Switch(false) => Vec::new(),
            OptionValue::Switch(true) => vec![self.switch(name)],
            OptionValue::Text(text) => self.pair(name, text),
            OptionValue::List(items) => items.iter().flat_map(|item| self.pair(name, item)).collect(),
        }
    }

    /// Render a whole ordered mapping.
    pub fn render_all(&self, options: &[(String, OptionValue)]) -> Vec<String> {
        options
            .iter()
            .flat_map(|(name, value)| self.render(name, value))
            .collect()
    }

    fn switch(&self, name: &str) -> String {
        match self {
            ArgStyle::DoubleDash => format!("--{}", name),
            ArgStyle::KeyValue => format!("{}=true", name),
            _ => format!("-{}", name),
        }
    }

    fn pair(&self, name: &str, value: &str) -> Vec<String> {
        match self {
            ArgStyle::Dash => vec![format!("-{}", name), value.to_string()],
            ArgStyle::DoubleDash => vec![format!("--{}", name), value.to_string()],
            ArgStyle::KeyValue => vec![format!("{}={}", name, value)],
            ArgStyle::DashKeyValue => vec![format!("-{}={}", name, value)],
            ArgStyle::Custom(render) => render(name, &OptionValue::Text(value.to_string())),
        }
    }
}

impl fmt::Debug for ArgStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgStyle::Dash => f.write_str("Dash"),
            ArgStyle::DoubleDash => f.write_str("DoubleDash"),
            ArgStyle::KeyValue => f.write_str("KeyValue"),
            ArgStyle::DashKeyValue => f.write_str("DashKeyValue"),
            ArgStyle::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
