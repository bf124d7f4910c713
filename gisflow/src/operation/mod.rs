//! Unit operations - reusable, immutable command configurations.
//!
//! A [`UnitOperation`] binds an external command to a fixed, ordered option
//! mapping and defers only its input and output paths. Options are opaque:
//! they are rendered according to the operation's [`ArgStyle`] and passed
//! through without validation.
//!
//! ## Command line shape
//!
//! ```text
//! command [leading args] [rendered options] inputs... [trailing args] output
//!
//! gdal_translate -ot Byte -b 1 -of GTiff -co NUM_THREADS=ALL_CPUS in.tif out.tif
//! gdaldem color-relief dem.tif ramp.txt relief.tif
//!         └─leading─┘       └trailing┘
//! ```

mod args;
mod catalog;
mod runner;

pub use args::{ArgStyle, OptionValue, RenderFn};
pub use catalog::{OperationCatalog, OperationSpec};
pub use runner::{CommandRunner, Invocation, ProcessRunner, RunOutput};

use crate::workflow::FileHandle;
use gisflow_shared::errors::{GisflowError, GisflowResult};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Immutable configuration of an external command.
///
/// Cloning is cheap and every clone shares the same configuration; there is
/// no way to change it after [`UnitOperationBuilder::build`]. Invoking the
/// same operation any number of times, concurrently or within one chain, is
/// safe.
#[derive(Clone)]
pub struct UnitOperation {
    inner: Arc<OperationDef>,
}

struct OperationDef {
    command: String,
    label: String,
    options: Vec<(String, OptionValue)>,
    style: ArgStyle,
    leading_args: Vec<OsString>,
    trailing_args: Vec<OsString>,
    output_extension: Option<String>,
    output_name: Option<String>,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
    runner: Arc<dyn CommandRunner>,
}

impl UnitOperation {
    /// Operation with `-name value` options, in the given order.
    pub fn new<I, K, V>(command: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<OptionValue>,
    {
        let mut builder = Self::builder(command);
        for (name, value) in options {
            builder = builder.option(name, value);
        }
        builder.build()
    }

    pub fn builder(command: impl Into<String>) -> UnitOperationBuilder {
        UnitOperationBuilder::new(command)
    }

    pub fn command(&self) -> &str {
        &self.inner.command
    }

    /// Label used in temp file names and logs.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn options(&self) -> &[(String, OptionValue)] {
        &self.inner.options
    }

    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.inner
            .options
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn style(&self) -> &ArgStyle {
        &self.inner.style
    }

    pub fn output_extension(&self) -> Option<&str> {
        self.inner.output_extension.as_deref()
    }

    /// Fixed file name for generated outputs, if configured.
    pub fn output_name(&self) -> Option<&str> {
        self.inner.output_name.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    /// Render the full argument list for concrete paths.
    ///
    /// Paths are passed through as raw OS strings, never re-encoded.
    pub fn render_args(&self, inputs: &[&Path], output: &Path) -> Vec<OsString> {
        let def = &self.inner;
        let mut args = Vec::with_capacity(
            def.leading_args.len() + def.options.len() * 2 + inputs.len() + def.trailing_args.len() + 1,
        );
        args.extend(def.leading_args.iter().cloned());
        args.extend(def.style.render_all(&def.options).into_iter().map(OsString::from));
        args.extend(inputs.iter().map(|p| p.as_os_str().to_owned()));
        args.extend(def.trailing_args.iter().cloned());
        args.push(output.as_os_str().to_owned());
        args
    }

    pub fn invocation(&self, inputs: &[&Path], output: &Path) -> Invocation {
        Invocation {
            command: self.inner.command.clone(),
            args: self.render_args(inputs, output),
            env: self.inner.env.clone(),
            working_dir: None,
            timeout: self.inner.timeout,
        }
    }

    /// Run the command against `inputs`, writing `output`.
    ///
    /// Inputs are only read. Fails with `InvalidArgument` if `output` is one
    /// of the inputs, and with `ExternalProcessFailure` if the command cannot
    /// be started, exits non-zero or times out.
    pub async fn invoke(&self, inputs: &[&FileHandle], output: &FileHandle) -> GisflowResult<RunOutput> {
        if inputs.is_empty() {
            return Err(GisflowError::InvalidArgument(format!(
                "{} needs at least one input",
                self.inner.command
            )));
        }
        if inputs.iter().any(|input| input.path() == output.path()) {
            return Err(GisflowError::InvalidArgument(format!(
                "{} would overwrite its own input {}",
                self.inner.command,
                output.path().display()
            )));
        }

        let input_paths: Vec<&Path> = inputs.iter().map(|h| h.path()).collect();
        let invocation = self.invocation(&input_paths, output.path());

        tracing::debug!(
            workflow_id = %output.workflow().id(),
            runner = self.inner.runner.name(),
            command_line = %invocation.display_line(),
            "Invoking unit operation"
        );

        self.inner.runner.run(&invocation).await
    }

    /// Command line with placeholder paths, for logs and debugging.
    pub fn describe(&self) -> String {
        let args = self.render_args(&[Path::new("<input>")], Path::new("<output>"));
        std::iter::once(self.inner.command.clone())
            .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for UnitOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOperation")
            .field("command", &self.inner.command)
            .field("options", &self.inner.options)
            .field("style", &self.inner.style)
            .field("runner", &self.inner.runner.name())
            .finish()
    }
}

impl fmt::Display for UnitOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Builder for [`UnitOperation`]. The only mutable stage of an operation.
pub struct UnitOperationBuilder {
    command: String,
    label: Option<String>,
    options: Vec<(String, OptionValue)>,
    style: ArgStyle,
    leading_args: Vec<OsString>,
    trailing_args: Vec<OsString>,
    output_extension: Option<String>,
    output_name: Option<String>,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
    runner: Option<Arc<dyn CommandRunner>>,
}

impl UnitOperationBuilder {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            label: None,
            options: Vec::new(),
            style: ArgStyle::default(),
            leading_args: Vec::new(),
            trailing_args: Vec::new(),
            output_extension: None,
            output_name: None,
            env: Vec::new(),
            timeout: None,
            runner: None,
        }
    }

    /// Append an option. Repeating a name appends another entry; it does not replace.
    pub fn option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.push((name.into(), value.into()));
        self
    }

    pub fn style(mut self, style: ArgStyle) -> Self {
        self.style = style;
        self
    }

    /// Arguments placed right after the command (e.g. `color-relief` for gdaldem).
    pub fn leading_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    /// Positional arguments between the inputs and the output (e.g. a color ramp file).
    pub fn trailing_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.trailing_args.push(arg.into());
        self
    }

    pub fn trailing_path(self, path: impl Into<PathBuf>) -> Self {
        self.trailing_arg(path.into().into_os_string())
    }

    /// Extension for generated outputs. Defaults to the input's extension.
    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        let ext = ext.into();
        self.output_extension = Some(ext.trim_start_matches('.').to_string());
        self
    }

    /// Fixed output file name (e.g. `relief.png`) instead of a generated one.
    ///
    /// The workflow still prefixes a sequence number, so reusing the
    /// operation never collides.
    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn build(self) -> UnitOperation {
        let label = self.label.unwrap_or_else(|| default_label(&self.command));
        UnitOperation {
            inner: Arc::new(OperationDef {
                command: self.command,
                label,
                options: self.options,
                style: self.style,
                leading_args: self.leading_args,
                trailing_args: self.trailing_args,
                output_extension: self.output_extension,
                output_name: self.output_name,
                env: self.env,
                timeout: self.timeout,
                runner: self.runner.unwrap_or_else(|| Arc::new(ProcessRunner)),
            }),
        }
    }
}

/// File stem of the command (`/usr/bin/gdal_translate` → `gdal_translate`).
fn default_label(command: &str) -> String {
    Path::new(command)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("op")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(args: &[OsString]) -> Vec<&str> {
        args.iter().map(|a| a.to_str().unwrap()).collect()
    }

    fn translate_to_byte() -> UnitOperation {
        UnitOperation::new(
            "gdal_translate",
            [
                ("ot", OptionValue::from("Byte")),
                ("b", 1.into()),
                ("of", "GTiff".into()),
                ("co", "NUM_THREADS=ALL_CPUS".into()),
            ],
        )
    }

    #[test]
    fn test_render_conventional_shape() {
        let op = translate_to_byte();
        let args = op.render_args(&[Path::new("/tmp/in.tif")], Path::new("/tmp/out.tif"));
        assert_eq!(
            strs(&args),
            vec![
                "-ot", "Byte", "-b", "1", "-of", "GTiff", "-co", "NUM_THREADS=ALL_CPUS",
                "/tmp/in.tif", "/tmp/out.tif"
            ]
        );
    }

    #[test]
    fn test_render_leading_and_trailing() {
        let op = UnitOperation::builder("gdaldem")
            .leading_arg("color-relief")
            .option("alpha", true)
            .trailing_arg("ramp.txt")
            .output_extension(".png")
            .build();
        let args = op.render_args(&[Path::new("dem.tif")], Path::new("relief.png"));
        assert_eq!(strs(&args), vec!["color-relief", "-alpha", "dem.tif", "ramp.txt", "relief.png"]);
        assert_eq!(op.output_extension(), Some("png"));
    }

    #[test]
    fn test_render_multiple_inputs() {
        let op = UnitOperation::builder("gdal_merge.py").option("o", "ignored").build();
        let args = op.render_args(&[Path::new("a.tif"), Path::new("b.tif")], Path::new("m.tif"));
        assert_eq!(strs(&args), vec!["-o", "ignored", "a.tif", "b.tif", "m.tif"]);
    }

    #[test]
    fn test_rendering_is_stable_across_calls() {
        let op = translate_to_byte();
        let first = op.render_args(&[Path::new("a.tif")], Path::new("x.tif"));
        let _ = op.render_args(&[Path::new("b.tif")], Path::new("y.tif"));
        let again = op.render_args(&[Path::new("a.tif")], Path::new("x.tif"));
        assert_eq!(first, again);
        assert_eq!(op.options().len(), 4);
    }

    #[test]
    fn test_clone_shares_configuration() {
        let op = translate_to_byte();
        let clone = op.clone();
        assert!(Arc::ptr_eq(&op.inner, &clone.inner));
        assert_eq!(clone.option("ot"), Some(&OptionValue::Text("Byte".into())));
    }

    #[test]
    fn test_default_label_and_describe() {
        let op = UnitOperation::builder("/usr/bin/gdalwarp").option("t_srs", "EPSG:4326").build();
        assert_eq!(op.label(), "gdalwarp");
        assert_eq!(op.describe(), "/usr/bin/gdalwarp -t_srs EPSG:4326 <input> <output>");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_pass_through_verbatim() {
        use std::os::unix::ffi::OsStrExt;

        let ramp = Path::new(std::ffi::OsStr::from_bytes(b"ramp-\xfe.txt"));
        let op = UnitOperation::builder("cp").trailing_path(ramp).build();
        let input = Path::new(std::ffi::OsStr::from_bytes(b"/data/dem-\xff.tif"));
        let output = Path::new("/tmp/out.tif");
        let args = op.render_args(&[input], output);

        assert_eq!(args[0].as_bytes(), b"/data/dem-\xff.tif");
        assert_eq!(args[1].as_bytes(), b"ramp-\xfe.txt");
        assert_eq!(args[2], OsString::from("/tmp/out.tif"));
        // Only the human-readable rendering is lossy.
        assert!(op.invocation(&[input], output).display_line().contains("dem-\u{fffd}.tif"));
    }

    #[test]
    fn test_output_name() {
        let op = UnitOperation::builder("gdaldem").output_name("relief.png").build();
        assert_eq!(op.output_name(), Some("relief.png"));
        assert_eq!(translate_to_byte().output_name(), None);
    }
}
