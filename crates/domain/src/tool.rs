//! Blocking subprocess runner shared by the separation, transcription and
//! notation stages.

use std::ffi::OsString;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::events::{PipelineEvent, StageContext};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Coarse-grained cancellation shared by every in-flight subprocess.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` was cancelled")]
    Cancelled { program: String },
    #[error("i/o error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Splits a configured command line such as `python -m demucs` on whitespace.
    pub fn parse(command_line: &str) -> Self {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().unwrap_or_default();
        parts.fold(Self::new(program), |cmd, arg| cmd.arg(arg))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Spawns the command, forwards its output to the log and waits for it,
    /// killing the child if the context gets cancelled.
    pub fn run(&self, ctx: &StageContext) -> Result<ToolRun, ToolError> {
        let program = self.program();
        if ctx.cancel_token().is_cancelled() {
            return Err(ToolError::Cancelled { program });
        }
        ctx.emit(PipelineEvent::ToolInvoked {
            command: self.to_string(),
        });

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().map(|out| drain(out, program.clone()));
        let stderr = child.stderr.take().map(|err| drain(err, program.clone()));

        let status = loop {
            if ctx.cancel_token().is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolError::Cancelled { program });
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => return Err(ToolError::Io { program, source }),
            }
        };

        let collect = |handle: Option<thread::JoinHandle<String>>| {
            handle
                .and_then(|handle| handle.join().ok())
                .unwrap_or_default()
        };
        Ok(ToolRun {
            status,
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

fn drain<R: Read + Send + 'static>(reader: R, program: String) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut collected = String::new();
        for line in BufReader::new(reader).lines().map_while(Result::ok) {
            debug!(%program, "{line}");
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}

#[derive(Debug)]
pub struct ToolRun {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolRun {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Short human readable reason for a failed run.
    pub fn failure_reason(&self) -> String {
        let tail = self
            .stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("no stderr output");
        format!("exited with {}: {}", self.status, tail.trim())
    }
}
