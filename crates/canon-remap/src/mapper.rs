//! The per-action path mapper and the factory that selects it.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use canon_config::{Config, ConfigError, RemapSettings, RequirementKeys};

use crate::artifact::{Artifact, ExecPath};
use crate::capability::{ArtifactExpander, MetadataProvider};
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::materialize::{self, MaterializeFs, StdFs};
use crate::policy::{self, ExecutionRequirements};
use crate::resolver::{self, ExecPathMapping};
use crate::MaterializeError;

/// A function from exec path to exec path.
pub trait PathMapping {
    fn map_path(&self, path: &ExecPath) -> ExecPath;
}

impl<F> PathMapping for F
where
    F: Fn(&ExecPath) -> ExecPath,
{
    fn map_path(&self, path: &ExecPath) -> ExecPath {
        self(path)
    }
}

/// Replace the configuration segment with the runfiles literal.
///
/// Not content-addressed and independent of any action's mapping. Paths
/// without a configuration segment are returned unchanged.
pub fn runfiles_path(path: &ExecPath, settings: &RemapSettings) -> ExecPath {
    path.with_segment(settings.config_segment, &settings.runfiles_segment)
        .unwrap_or_else(|| path.clone())
}

enum Mode {
    Identity,
    PerAction(ActionMapping),
}

struct ActionMapping {
    mapping: ExecPathMapping,
    materialize_inputs: bool,
    settings: RemapSettings,
}

/// Rewrites an action's paths to their canonical form.
///
/// Immutable once built; share it freely across threads.
pub struct PathMapper {
    mode: Mode,
    sink: Arc<dyn DiagnosticSink>,
}

impl PathMapper {
    /// Mapper that leaves every path unchanged.
    pub fn identity() -> Self {
        Self::identity_with_sink(Arc::new(TracingSink))
    }

    pub fn identity_with_sink(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            mode: Mode::Identity,
            sink,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.mode, Mode::Identity)
    }

    /// The per-action nonce, if remapping is active.
    pub fn nonce(&self) -> Option<&str> {
        match &self.mode {
            Mode::Identity => None,
            Mode::PerAction(action) => Some(action.mapping.nonce()),
        }
    }

    pub fn materializes_inputs(&self) -> bool {
        match &self.mode {
            Mode::Identity => false,
            Mode::PerAction(action) => action.materialize_inputs,
        }
    }

    /// Input mapping entries in original-path order; empty for identity.
    pub fn entries(&self) -> Vec<(&ExecPath, &ExecPath)> {
        match &self.mode {
            Mode::Identity => Vec::new(),
            Mode::PerAction(action) => action.mapping.iter().collect(),
        }
    }

    /// Canonical form of an exec path.
    ///
    /// Inputs get their content-addressed virtual path. Anything else is an
    /// output of this action and gets the fixed output literal.
    pub fn map_input_path(&self, path: &ExecPath) -> ExecPath {
        match &self.mode {
            Mode::Identity => path.clone(),
            Mode::PerAction(action) => {
                if let Some(mapped) = action.mapping.get(path) {
                    return mapped.clone();
                }
                path.with_segment(
                    action.settings.config_segment,
                    &action.settings.output_segment,
                )
                .unwrap_or_else(|| path.clone())
            }
        }
    }

    /// Canonical path string for an artifact; source paths pass through.
    pub fn map_artifact(&self, artifact: &Artifact) -> String {
        if artifact.is_source() {
            return artifact.exec_path().to_string();
        }
        self.map_input_path(artifact.exec_path()).into()
    }

    /// Tool-specific arguments whose structure is unknown are returned as-is.
    pub fn adjust_custom_args(&self, args: Vec<String>) -> Vec<String> {
        if !self.is_identity() && !args.is_empty() {
            self.sink
                .emit(Diagnostic::CustomArgsUnchanged { count: args.len() });
        }
        args
    }

    /// Rewrite arguments that name a remapped input or one of `outputs`.
    ///
    /// An argument is rewritten if it is exactly such an exec path, or has
    /// the form `<flag>=<exec path>`. Inputs take their virtual path and
    /// outputs the output literal. Everything else is kept.
    pub fn rewrite_args(&self, args: &[String], outputs: &[ExecPath]) -> Vec<String> {
        let outputs: HashSet<&ExecPath> = outputs.iter().collect();
        args.iter()
            .map(|arg| self.rewrite_arg(arg, &outputs))
            .collect()
    }

    /// Rewrite a response file line by line, keeping line endings.
    pub fn rewrite_param_file(&self, contents: &str, outputs: &[ExecPath]) -> String {
        let outputs: HashSet<&ExecPath> = outputs.iter().collect();
        let mut out = String::with_capacity(contents.len());
        for line in contents.split_inclusive('\n') {
            let (body, ending) = match line.strip_suffix("\r\n") {
                Some(body) => (body, "\r\n"),
                None => match line.strip_suffix('\n') {
                    Some(body) => (body, "\n"),
                    None => (line, ""),
                },
            };
            out.push_str(&self.rewrite_arg(body, &outputs));
            out.push_str(ending);
        }
        out
    }

    fn rewrite_arg(&self, arg: &str, outputs: &HashSet<&ExecPath>) -> String {
        if self.is_identity() {
            return arg.to_string();
        }
        if let Some(mapped) = self.lookup_arg(arg, outputs) {
            return mapped.to_string();
        }
        if let Some((flag, value)) = arg.split_once('=') {
            if let Some(mapped) = self.lookup_arg(value, outputs) {
                return format!("{}={}", flag, mapped);
            }
        }
        arg.to_string()
    }

    /// Mapped form of `candidate` if it is a known input or a listed output.
    fn lookup_arg(&self, candidate: &str, outputs: &HashSet<&ExecPath>) -> Option<ExecPath> {
        let Mode::PerAction(action) = &self.mode else {
            return None;
        };
        let path = ExecPath::new(candidate).ok()?;
        if let Some(mapped) = action.mapping.get(&path) {
            return Some(mapped.clone());
        }
        outputs
            .contains(&path)
            .then(|| self.map_input_path(&path))
    }

    /// Create the virtual input tree under `exec_root` if the action asked
    /// for materialized inputs. Returns the number of links published.
    pub fn materialize(&self, exec_root: &Path) -> Result<usize, MaterializeError> {
        self.materialize_with(exec_root, &StdFs)
    }

    pub fn materialize_with(
        &self,
        exec_root: &Path,
        fs: &dyn MaterializeFs,
    ) -> Result<usize, MaterializeError> {
        match &self.mode {
            Mode::PerAction(action) if action.materialize_inputs => {
                materialize::materialize_mapping(&action.mapping, exec_root, fs, self.sink.as_ref())
            }
            _ => Ok(0),
        }
    }
}

impl PathMapping for PathMapper {
    fn map_path(&self, path: &ExecPath) -> ExecPath {
        self.map_input_path(path)
    }
}

impl fmt::Debug for PathMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.mode {
            Mode::Identity => f.write_str("PathMapper::Identity"),
            Mode::PerAction(action) => f
                .debug_struct("PathMapper::PerAction")
                .field("nonce", &action.mapping.nonce())
                .field("entries", &action.mapping.len())
                .field("materialize_inputs", &action.materialize_inputs)
                .finish(),
        }
    }
}

/// Builds a [`PathMapper`] per action.
#[derive(Clone)]
pub struct Remapper {
    settings: RemapSettings,
    keys: RequirementKeys,
    sink: Arc<dyn DiagnosticSink>,
}

impl Remapper {
    /// Fails if `settings` or `keys` would not produce well-formed paths.
    pub fn new(settings: RemapSettings, keys: RequirementKeys) -> Result<Self, ConfigError> {
        settings.validate()?;
        keys.validate()?;
        Ok(Self {
            settings,
            keys,
            sink: Arc::new(TracingSink),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(config.remap.clone(), config.requirements.clone())
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build the mapper for one action.
    ///
    /// Falls back to [`PathMapper::identity`] when the action does not opt
    /// in, when `metadata` is absent, or when any derived input's digest
    /// cannot be obtained.
    pub fn build(
        &self,
        requirements: &ExecutionRequirements,
        expander: &dyn ArtifactExpander,
        metadata: Option<&dyn MetadataProvider>,
        inputs: &[Artifact],
    ) -> PathMapper {
        let identity = || PathMapper::identity_with_sink(Arc::clone(&self.sink));

        if let Err(reason) = policy::check(requirements, &self.keys, metadata.is_some()) {
            self.sink.emit(Diagnostic::Disabled {
                reason: reason.as_str(),
            });
            return identity();
        }
        let Some(metadata) = metadata else {
            return identity();
        };

        match resolver::resolve(inputs, expander, metadata, &self.settings, self.sink.as_ref()) {
            Some(mapping) => PathMapper {
                mode: Mode::PerAction(ActionMapping {
                    mapping,
                    materialize_inputs: policy::wants_materialized_inputs(
                        requirements,
                        &self.keys,
                    ),
                    settings: self.settings.clone(),
                }),
                sink: Arc::clone(&self.sink),
            },
            None => identity(),
        }
    }

    pub fn runfiles_path(&self, path: &ExecPath) -> ExecPath {
        runfiles_path(path, &self.settings)
    }
}

impl fmt::Debug for Remapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remapper")
            .field("settings", &self.settings)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}
