//! The contract every tool adapter implements.
//!
//! An adapter either supplies [`Runner::prepare`] and inherits the default
//! [`Runner::run`], which executes the prepared command line once, or it
//! overrides `run` when the tool needs more than one process.

use crate::exec::{self, CommandLine, ExecError, ExecutionResult, ResourceLimits};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_URL: &str = "https://github.com/symbiflow/sv-tests";

/// Failures of the harness itself. A tool that runs and exits non-zero is
/// reported through [`RunOutput`], never through this type.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("invalid test parameter `{key}`: {reason}")]
    Parameter { key: String, reason: String },
    #[error("runner `{runner}` does not build a single command line")]
    PrepareUnsupported { runner: String },
    #[error("failed to stage {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown runner: {0}")]
    UnknownRunner(String),
}

impl RunnerError {
    pub(crate) fn parameter(key: &str, reason: impl Into<String>) -> Self {
        Self::Parameter {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable classification used in JSON error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Exec(ExecError::Spawn { .. }) => "tool_not_started",
            Self::Exec(ExecError::WorkingDirectory(_)) => "invalid_working_directory",
            Self::Exec(ExecError::Decode { .. }) => "output_not_utf8",
            Self::Exec(_) => "execution_failed",
            Self::Parameter { .. } => "invalid_parameter",
            Self::PrepareUnsupported { .. } => "prepare_unsupported",
            Self::Io { .. } => "staging_failed",
            Self::UnknownRunner(_) => "unknown_runner",
        }
    }
}

/// Who the adapter is and how its processes are launched. Fixed at construction.
#[derive(Debug, Clone)]
pub struct RunnerIdentity {
    name: String,
    executable: Option<String>,
    url: String,
    env: BTreeMap<String, String>,
    limits: ResourceLimits,
}

impl RunnerIdentity {
    pub fn new(name: impl Into<String>, executable: Option<&str>) -> Self {
        Self {
            name: name.into(),
            executable: executable.map(str::to_string),
            url: DEFAULT_URL.to_string(),
            env: BTreeMap::new(),
            limits: ResourceLimits::default(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executable(&self) -> Option<&str> {
        self.executable.as_deref()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

/// Metadata of one test case, keyed by field name without its `:` markers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "BTreeMap<String, Value>")]
pub struct TestParameters {
    values: BTreeMap<String, Value>,
}

impl From<BTreeMap<String, Value>> for TestParameters {
    fn from(raw: BTreeMap<String, Value>) -> Self {
        let mut params = Self::default();
        for (key, value) in raw {
            params.insert(&key, value);
        }
        params
    }
}

pub fn normalize_key(key: &str) -> &str {
    key.trim().trim_matches(':')
}

impl TestParameters {
    pub fn new(top_module: &str, files: &[&str]) -> Self {
        let mut params = Self::default();
        params.insert("top_module", Value::from(top_module));
        params.insert("files", Value::from(files.to_vec()));
        params
    }

    pub fn insert(&mut self, key: &str, value: Value) -> &mut Self {
        self.values.insert(normalize_key(key).to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn top_module(&self) -> Result<&str, RunnerError> {
        self.get_str("top_module")?
            .ok_or_else(|| RunnerError::parameter("top_module", "missing"))
    }

    pub fn files(&self) -> Result<Vec<String>, RunnerError> {
        if !self.values.contains_key("files") {
            return Err(RunnerError::parameter("files", "missing"));
        }
        self.get_list("files")
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>, RunnerError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(RunnerError::parameter(
                key,
                format!("expected string, got {}", value_type_name(other)),
            )),
        }
    }

    /// Optional list of strings. A missing key is an empty list, and a bare
    /// string is split on whitespace the way multi-valued metadata fields are written.
    pub fn get_list(&self, key: &str) -> Result<Vec<String>, RunnerError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(s.split_whitespace().map(str::to_string).collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        RunnerError::parameter(
                            key,
                            format!("expected list of strings, found {}", value_type_name(item)),
                        )
                    })
                })
                .collect(),
            Some(other) => Err(RunnerError::parameter(
                key,
                format!("expected list, got {}", value_type_name(other)),
            )),
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutput {
    pub log: String,
    pub exit_code: i32,
}

impl RunOutput {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

impl From<ExecutionResult> for RunOutput {
    fn from(result: ExecutionResult) -> Self {
        Self {
            log: result.output,
            exit_code: result.exit_code,
        }
    }
}

pub trait Runner {
    fn identity(&self) -> &RunnerIdentity;

    fn name(&self) -> &str {
        self.identity().name()
    }

    /// Builds the command line and stages any files the tool needs under
    /// `work_dir`. Identical inputs must give identical command lines.
    fn prepare(
        &self,
        _work_dir: &Path,
        _params: &TestParameters,
    ) -> Result<CommandLine, RunnerError> {
        Err(RunnerError::PrepareUnsupported {
            runner: self.name().to_string(),
        })
    }

    fn run(&self, work_dir: &Path, params: &TestParameters) -> Result<RunOutput, RunnerError> {
        let command = self.prepare(work_dir, params)?;
        debug!(runner = self.name(), tokens = ?command.tokens(), "prepared command line");
        let identity = self.identity();
        let result = exec::execute(work_dir, &command, identity.env(), identity.limits())?;
        info!(runner = self.name(), exit_code = result.exit_code, "run finished");
        Ok(result.into())
    }

    /// Whether the backing tool is installed. Adapters without a single
    /// executable are always considered runnable.
    fn can_run(&self) -> bool {
        match self.identity().executable() {
            Some(executable) => exec::resolve_executable(executable).is_some(),
            None => true,
        }
    }
}
