//! Runs the analysis worker for one job and records the terminal state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;

use super::subprocess::{self, ProcessOutput, SpawnError};
use crate::analysis::{parse_worker_output, AnalysisResult, PayloadError};
use crate::store::JobStore;
use crate::types::JobId;

/// How many trailing characters of stderr are kept in a failure reason.
const STDERR_SUMMARY_CHARS: usize = 2000;

/// Failure reason recorded when stdout cannot be parsed into a result.
pub const MALFORMED_OUTPUT_REASON: &str = "malformed worker output";

/// How to launch the external worker.
///
/// The artifact path is appended as the final (and, for the worker script,
/// only) positional argument: `<program> [<script>] <artifact_path>`.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: String,
    pub script: Option<String>,
    pub working_dir: Option<PathBuf>,
    /// Maximum runtime; `None` lets the worker run indefinitely.
    pub timeout: Option<Duration>,
}

impl WorkerCommand {
    fn build(&self, artifact_path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(script) = &self.script {
            cmd.arg(script);
        }
        cmd.arg(artifact_path);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// A job handed to the invoker by the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchedJob {
    pub job_id: JobId,
    pub artifact_path: PathBuf,
}

/// Why a worker run did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum WorkerFailure {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("worker exited with code {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },

    #[error("worker produced no output: {stderr}")]
    EmptyOutput { stderr: String },

    #[error("worker reported an error: {0}")]
    Reported(String),

    /// Details are logged; the recorded reason stays generic.
    #[error("malformed worker output")]
    Malformed(PayloadError),
}

/// Turn a finished process into a result or a failure.
pub fn interpret_output(output: &ProcessOutput) -> Result<AnalysisResult, WorkerFailure> {
    if output.exit_code != 0 {
        return Err(WorkerFailure::NonZeroExit {
            exit_code: output.exit_code,
            stderr: summarize_stderr(&output.stderr),
        });
    }
    if output.stdout.trim().is_empty() {
        return Err(WorkerFailure::EmptyOutput {
            stderr: summarize_stderr(&output.stderr),
        });
    }
    parse_worker_output(&output.stdout).map_err(|e| match e {
        PayloadError::Reported(message) => WorkerFailure::Reported(message),
        other => WorkerFailure::Malformed(other),
    })
}

/// Trim stderr and keep only its tail, where the fatal error usually is.
pub fn summarize_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return "no diagnostic output".to_string();
    }
    let total = trimmed.chars().count();
    if total <= STDERR_SUMMARY_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(total - STDERR_SUMMARY_CHARS).collect();
    format!("…{tail}")
}

/// Executes at most one worker process per dispatched job.
pub struct WorkerInvoker {
    store: Arc<dyn JobStore>,
    command: WorkerCommand,
}

impl WorkerInvoker {
    pub fn new(store: Arc<dyn JobStore>, command: WorkerCommand) -> Self {
        Self { store, command }
    }

    /// Drive one job from `Created` to a terminal state.
    ///
    /// Store errors are logged, never retried.
    pub async fn run(&self, job: DispatchedJob) {
        let job_id = job.job_id;

        if let Err(e) = self.store.set_processing(job_id).await {
            tracing::error!(job_id = %job_id, error = %e, "Could not mark job as processing, skipping");
            return;
        }
        tracing::info!(job_id = %job_id, path = %job.artifact_path.display(), "Worker started");

        let outcome = self.execute(&job.artifact_path).await;

        let recorded = match outcome {
            Ok(result) => {
                tracing::info!(
                    job_id = %job_id,
                    document_type = %result.document_type,
                    clauses = result.clauses.len(),
                    "Analysis completed",
                );
                self.store.set_completed(job_id, &result).await
            }
            Err(failure) => {
                if let WorkerFailure::Malformed(detail) = &failure {
                    tracing::warn!(job_id = %job_id, detail = %detail, "Worker output could not be parsed");
                }
                let reason = failure.to_string();
                tracing::warn!(job_id = %job_id, reason = %reason, "Analysis failed");
                self.store.set_failed(job_id, &reason).await
            }
        };

        if let Err(e) = recorded {
            tracing::error!(job_id = %job_id, error = %e, "Failed to record terminal job state");
        }
    }

    async fn execute(&self, artifact_path: &Path) -> Result<AnalysisResult, WorkerFailure> {
        let mut cmd = self.command.build(artifact_path);
        let output = subprocess::run_command(&mut cmd, self.command.timeout).await?;
        tracing::debug!(
            exit_code = output.exit_code,
            duration_ms = output.duration_ms,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Worker exited",
        );
        interpret_output(&output)
    }
}
