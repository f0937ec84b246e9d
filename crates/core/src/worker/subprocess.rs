//! Child-process execution for the analysis worker.
//!
//! [`run_command`] spawns the configured command, captures stdout and
//! stderr separately, and enforces an optional wall-clock limit.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Output exceeding this limit is truncated to prevent memory exhaustion
/// from extremely verbose workers.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Captured output from a finished worker process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub duration_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to launch worker: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker timed out after {}s", .elapsed.as_secs())]
    Timeout { elapsed: Duration },
}

/// Spawn `cmd`, capture its output streams, and wait for it to exit.
///
/// stdin is closed. With `timeout = Some(limit)` the child is killed once
/// the limit expires (`kill_on_drop`).
pub async fn run_command(
    cmd: &mut Command,
    timeout: Option<Duration>,
) -> Result<ProcessOutput, SpawnError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    // Read both pipes concurrently so a chatty stderr cannot block stdout.
    let stdout_task = tokio::spawn(read_stream(child.stdout.take(), "stdout"));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take(), "stderr"));

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_elapsed) => {
                // `child` is dropped on return, which kills the process.
                stdout_task.abort();
                stderr_task.abort();
                return Err(SpawnError::Timeout {
                    elapsed: start.elapsed(),
                });
            }
        },
        None => child.wait().await?,
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    Ok(ProcessOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        exit_code: status.code().unwrap_or(-1),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Read an entire output stream, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>, stream: &'static str) -> Vec<u8> {
    let Some(h) = handle else {
        return Vec::new();
    };
    let (buf, truncated) = read_capped(h, MAX_OUTPUT_BYTES).await;
    if truncated {
        tracing::warn!(
            stream,
            limit_bytes = MAX_OUTPUT_BYTES,
            "Worker output exceeded capture limit and was truncated",
        );
    }
    buf
}

/// Read at most `limit` bytes. The flag reports whether more data followed.
async fn read_capped<R: AsyncRead + Unpin>(reader: R, limit: usize) -> (Vec<u8>, bool) {
    let mut buf = Vec::new();
    // One byte past the limit tells a full stream apart from a cut one.
    let _ = reader.take(limit as u64 + 1).read_to_end(&mut buf).await;
    let truncated = buf.len() > limit;
    buf.truncate(limit);
    (buf, truncated)
}
