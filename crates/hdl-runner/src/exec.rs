//! Subprocess spawn-and-capture shared by every runner.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::debug;

/// Data-segment ceiling applied to every tool process unless a runner opts out.
pub const DEFAULT_DATA_LIMIT_BYTES: u64 = 4 << 30;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("empty command line")]
    EmptyCommand,
    #[error("working directory does not exist or is not a directory: {}", .0.display())]
    WorkingDirectory(PathBuf),
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to collect output of `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("output of `{program}` is not valid UTF-8: {source}")]
    Decode {
        program: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// `RLIMIT_DATA` for the child, soft and hard. `None` leaves the inherited limit alone.
    pub data_bytes: Option<u64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            data_bytes: Some(DEFAULT_DATA_LIMIT_BYTES),
        }
    }
}

impl ResourceLimits {
    pub fn unlimited() -> Self {
        Self { data_bytes: None }
    }

    pub fn with_data_bytes(bytes: u64) -> Self {
        Self {
            data_bytes: Some(bytes),
        }
    }
}

/// Tokens of one tool invocation. The first token is the program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    tokens: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            tokens: vec![program.into()],
        }
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn arg(&mut self, token: impl Into<String>) -> &mut Self {
        self.tokens.push(token.into());
        self
    }

    pub fn args<I, S>(&mut self, tokens: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    pub fn arguments(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or(&[])
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Combined stdout and stderr in the order the kernel delivered them.
    pub output: String,
    /// Exit status, or the negated signal number if the child was killed.
    pub exit_code: i32,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs `command` in `work_dir` and waits for it.
///
/// A non-zero exit is a normal result. Errors are reserved for the cases where
/// the tool could not be started or observed at all.
pub fn execute(
    work_dir: &Path,
    command: &CommandLine,
    env_overlay: &BTreeMap<String, String>,
    limits: &ResourceLimits,
) -> Result<ExecutionResult, ExecError> {
    let program = command.program().ok_or(ExecError::EmptyCommand)?.to_string();
    if !work_dir.is_dir() {
        return Err(ExecError::WorkingDirectory(work_dir.to_path_buf()));
    }

    let io_err = |source| ExecError::Io {
        program: program.clone(),
        source,
    };
    let (mut reader, writer) = io::pipe().map_err(io_err)?;
    let writer_err = writer.try_clone().map_err(io_err)?;

    debug!(
        program = %program,
        cwd = %work_dir.display(),
        args = ?command.arguments(),
        data_limit = ?limits.data_bytes,
        "spawning tool"
    );

    // `cmd` owns the parent's copies of the write end and must be dropped
    // before reading, otherwise the pipe never reaches EOF.
    let mut child = {
        let mut cmd = Command::new(&program);
        cmd.args(command.arguments());
        cmd.current_dir(work_dir);
        cmd.envs(env_overlay);
        cmd.stdin(Stdio::null());
        cmd.stdout(writer);
        cmd.stderr(writer_err);
        apply_limits(&mut cmd, limits);
        cmd.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?
    };

    let mut bytes = Vec::new();
    let read = reader.read_to_end(&mut bytes);
    let status = child.wait().map_err(io_err)?;
    read.map_err(io_err)?;

    let exit_code = exit_code(status);
    debug!(program = %program, exit_code, bytes = bytes.len(), "tool finished");

    let output = String::from_utf8(bytes).map_err(|source| ExecError::Decode {
        program: program.clone(),
        source,
    })?;
    Ok(ExecutionResult { output, exit_code })
}

/// Looks `name` up the way a shell would: directly if it contains a path
/// separator, otherwise through each `PATH` entry.
pub fn resolve_executable(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable_file(candidate).then(|| candidate.to_path_buf());
    }
    let search = env::var_os("PATH")?;
    env::split_paths(&search)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|p| is_executable_file(p))
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

#[cfg(unix)]
fn apply_limits(cmd: &mut Command, limits: &ResourceLimits) {
    use std::os::unix::process::CommandExt as _;
    if let Some(bytes) = limits.data_bytes {
        // SAFETY: the hook only calls setrlimit, which is async-signal-safe.
        unsafe {
            cmd.pre_exec(move || set_data_limit(bytes));
        }
    }
}

#[cfg(not(unix))]
fn apply_limits(_cmd: &mut Command, limits: &ResourceLimits) {
    if limits.data_bytes.is_some() {
        tracing::warn!("data-segment limit is not supported on this platform");
    }
}

#[cfg(unix)]
fn set_data_limit(bytes: u64) -> io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: bytes as libc::rlim_t,
        rlim_max: bytes as libc::rlim_t,
    };
    if unsafe { libc::setrlimit(libc::RLIMIT_DATA, &limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
