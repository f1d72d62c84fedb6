//! Subprocess invocation with timeouts.

use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};
use wait_timeout::ChildExt;

use super::error::{SystemError, SystemResult};

/// A process to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    /// Command with no arguments and a 60s timeout.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Kill the process after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program name for messages.
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Arguments as lossy strings, mostly for assertions and logs.
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

/// Captured result of a successful process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run a process to completion, capturing its output.
///
/// Non-zero exit becomes [`SystemError::Exit`]; exceeding the timeout kills
/// the child and becomes [`SystemError::Timeout`].
pub(crate) fn run_command(spec: &CommandSpec) -> SystemResult<CommandOutput> {
    let program = spec.program_name();
    debug!(program = %program, args = ?spec.arg_strings(), "Running command");

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    let mut child = command.spawn().map_err(|source| SystemError::Spawn {
        program: program.clone(),
        source,
    })?;

    // Drain both pipes on their own threads so a chatty child cannot block
    // on a full pipe while we wait on it.
    let stdout = drain(&mut child, Stream::Stdout);
    let stderr = drain(&mut child, Stream::Stderr);

    let status = match child.wait_timeout(spec.timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SystemError::Timeout {
                program,
                secs: spec.timeout.as_secs(),
            });
        }
        Err(source) => {
            let _ = child.kill();
            return Err(SystemError::Spawn { program, source });
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    for line in stdout.lines() {
        trace!("[{}] {}", program, line);
    }

    if status.success() {
        Ok(CommandOutput { stdout, stderr })
    } else {
        Err(SystemError::Exit {
            program,
            code: status.code(),
            stderr: stderr.trim().to_string(),
        })
    }
}

enum Stream {
    Stdout,
    Stderr,
}

fn drain(child: &mut Child, stream: Stream) -> thread::JoinHandle<String> {
    let reader: Option<Box<dyn Read + Send>> = match stream {
        Stream::Stdout => child.stdout.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
        Stream::Stderr => child.stderr.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
    };

    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = reader {
            let _ = r.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}
