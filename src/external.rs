//! Optional external helper processes.
//!
//! A helper is started with a JSON file path as its last argument and reports
//! on stdout. Every run is bounded by a timeout, and stdout goes to a temp
//! file rather than a pipe so a chatty helper cannot stall on a full buffer.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Why a helper produced no result at all.
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("no command configured")]
    NoCommand,
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: std::io::Error },
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Exit status and captured stdout of a helper that ran to completion.
#[derive(Debug)]
pub struct Finished {
    pub status: ExitStatus,
    pub stdout: String,
}

/// A helper command line plus its time limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    command: Vec<String>,
    timeout: Duration,
}

impl ExternalCommand {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// The command line for log messages.
    pub fn display(&self) -> String {
        self.command.join(" ")
    }

    /// Run the helper on `file` and wait for it, killing it at the timeout.
    pub fn run(&self, file: &Path) -> Result<Finished, ExternalError> {
        let (program, args) = self.command.split_first().ok_or(ExternalError::NoCommand)?;

        let mut output = tempfile::tempfile()?;
        let mut child = Command::new(program)
            .args(args)
            .arg(file)
            .stdin(Stdio::null())
            .stdout(Stdio::from(output.try_clone()?))
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ExternalError::Spawn { program: program.clone(), source })?;

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExternalError::TimedOut(self.timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let mut stdout = String::new();
        output.seek(SeekFrom::Start(0))?;
        output.read_to_string(&mut stdout)?;
        Ok(Finished { status, stdout })
    }
}
