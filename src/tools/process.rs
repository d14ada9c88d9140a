//! Streaming subprocess runner with an output cap, a timeout and cooperative abort.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::context::StreamCallback;
use crate::config::{DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_MAX_OUTPUT_CHARS};

const READ_CHUNK: usize = 8192;

pub const TRUNCATED_MARKER: &str = "... (output truncated)";
pub const TIMED_OUT_MARKER: &str = "[timed out]";
pub const ABORTED_MARKER: &str = "[aborted]";

/// Limits for one shell command.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub timeout: Duration,
    pub max_output_chars: usize,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }
}

/// How a run ended. None of these is an error: every run yields output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Completed,
    TimedOut,
    OutputLimitExceeded,
    Aborted,
}

/// Collected output and how the command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    pub output: String,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    /// Text for the model: the output plus a marker for anything abnormal.
    pub fn render(&self) -> String {
        let mut text = self.output.clone();
        let marker = match self.status {
            ProcessStatus::Completed => None,
            ProcessStatus::TimedOut => Some(TIMED_OUT_MARKER),
            ProcessStatus::OutputLimitExceeded => Some(TRUNCATED_MARKER),
            ProcessStatus::Aborted => Some(ABORTED_MARKER),
        };
        if let Some(marker) = marker {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(marker);
        }

        if text.is_empty() {
            text = "(no output)".to_string();
        }
        match self.exit_code {
            Some(code) if code != 0 => format!("Exit code: {}\n{}", code, text),
            _ => text,
        }
    }
}

/// Run `command` through `bash -c`, streaming stdout and stderr as they arrive.
///
/// Resolves exactly once: on exit, on reaching the output cap, on timeout, or
/// on cancellation. In the last three cases the shell's whole process group
/// is killed, so background jobs and pipelines go with it.
pub async fn run(
    command: &str,
    working_dir: &Path,
    options: &ProcessOptions,
    on_chunk: Option<&StreamCallback>,
    cancel: &CancellationToken,
) -> crate::Result<ProcessOutcome> {
    let started = Instant::now();

    let mut cmd = Command::new("bash");
    cmd.arg("-c").arg(command);
    cmd.current_dir(working_dir);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|e| crate::Error::Process(format!("Failed to spawn: {}", e)))?;
    let mut group = GroupGuard { pgid: child.id() };

    let (tx, mut rx) = mpsc::channel::<String>(64);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, tx.clone()));
    }
    drop(tx);

    let deadline = tokio::time::sleep(options.timeout);
    tokio::pin!(deadline);

    let mut output = String::new();
    let mut chars = 0usize;
    let mut streams_open = true;

    let (status, exit_code) = loop {
        tokio::select! {
            _ = cancel.cancelled() => break (ProcessStatus::Aborted, None),
            _ = &mut deadline => break (ProcessStatus::TimedOut, None),
            chunk = rx.recv(), if streams_open => match chunk {
                Some(chunk) => {
                    let room = options.max_output_chars.saturating_sub(chars);
                    let taken: String = chunk.chars().take(room).collect();
                    let taken_chars = taken.chars().count();
                    chars += taken_chars;
                    if !taken.is_empty() {
                        if let Some(callback) = on_chunk {
                            callback(&taken);
                        }
                        output.push_str(&taken);
                    }
                    if taken_chars < chunk.chars().count() {
                        break (ProcessStatus::OutputLimitExceeded, None);
                    }
                }
                None => streams_open = false,
            },
            exit = child.wait(), if !streams_open => {
                let code = exit.ok().and_then(|status| status.code());
                break (ProcessStatus::Completed, code);
            }
        }
    };

    if status == ProcessStatus::Completed {
        group.disarm();
    } else {
        group.kill();
        if let Err(e) = child.kill().await {
            tracing::debug!(error = %e, "failed to kill child process");
        }
        tracing::debug!(?status, command = %command, "process terminated early");
    }

    Ok(ProcessOutcome {
        status,
        output,
        exit_code,
        elapsed: started.elapsed(),
    })
}

/// Kills the child's process group on drop unless the shell exited normally.
/// Must be dropped before the child is reaped so the group id is still ours.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use rustix::process::{Pid, Signal, kill_process_group};

    let Some(pid) = i32::try_from(pgid).ok().and_then(Pid::from_raw) else {
        return;
    };
    if let Err(e) = kill_process_group(pid, Signal::KILL) {
        tracing::debug!(pgid, error = %e, "failed to kill process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

async fn pump<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<String>) {
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buffer[..n]).into_owned();
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        }
    }
}
