use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Diagnostic output kept from a tool run, in characters
pub const MAX_CAPTURED_CHARS: usize = 64_000;

const READ_CHUNK: usize = 8 * 1024;

/// How long output is still read after the process itself has exited
pub const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to start process: {0}")]
    Spawn(io::Error),

    #[error("Process timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("Process I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    /// Interleaved stdout and stderr, truncated to the capture limit
    pub output: String,
}

impl ProcessOutput {
    /// Exit code, or -1 when the process was ended by a signal
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// Runs `command` to completion, bounded by `timeout`.
///
/// Both pipes are drained for the whole run so a chatty child never blocks on
/// a full pipe; only the first `max_chars` characters are kept. The timeout
/// bounds the process itself: once it exits, pipes still held open by its
/// descendants get `DRAIN_GRACE` before the capture is cut short. When the
/// timeout elapses the child is killed and reaped before returning.
pub async fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
    max_chars: usize,
) -> Result<ProcessOutput, ProcessError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(ProcessError::Spawn)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("stderr was not captured"))?;

    // Worst case four bytes per char before the lossy conversion
    let byte_cap = max_chars.saturating_mul(4);
    let mut captured = Vec::new();

    let status = {
        let drain = drain_combined(stdout, stderr, &mut captured, byte_cap);
        tokio::pin!(drain);
        let mut drained = false;

        let waited = tokio::time::timeout(timeout, async {
            loop {
                tokio::select! {
                    res = &mut drain, if !drained => {
                        res?;
                        drained = true;
                    }
                    status = child.wait() => return status,
                }
            }
        })
        .await;

        let status = match waited {
            Ok(status) => status?,
            Err(_elapsed) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill timed out process: {}", e);
                }
                return Err(ProcessError::TimedOut(timeout));
            }
        };

        if !drained {
            match tokio::time::timeout(DRAIN_GRACE, &mut drain).await {
                Ok(res) => res?,
                Err(_) => tracing::warn!(
                    "Process exited but its output pipes stayed open, keeping partial output"
                ),
            }
        }

        status
    };

    Ok(ProcessOutput {
        status,
        output: String::from_utf8_lossy(&captured)
            .chars()
            .take(max_chars)
            .collect(),
    })
}

enum Chunk {
    Stdout(usize),
    Stderr(usize),
}

async fn drain_combined<O, E>(
    mut stdout: O,
    mut stderr: E,
    captured: &mut Vec<u8>,
    byte_cap: usize,
) -> io::Result<()>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        let chunk = tokio::select! {
            n = stdout.read(&mut out_buf), if out_open => Chunk::Stdout(n?),
            n = stderr.read(&mut err_buf), if err_open => Chunk::Stderr(n?),
        };

        let data = match chunk {
            Chunk::Stdout(0) => {
                out_open = false;
                continue;
            }
            Chunk::Stderr(0) => {
                err_open = false;
                continue;
            }
            Chunk::Stdout(n) => &out_buf[..n],
            Chunk::Stderr(n) => &err_buf[..n],
        };

        let room = byte_cap.saturating_sub(captured.len());
        captured.extend_from_slice(&data[..data.len().min(room)]);
    }

    Ok(())
}
