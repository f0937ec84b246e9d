use std::path::PathBuf;
use std::time::Duration;

use clauselens_core::worker::WorkerCommand;

use crate::auth::jwt::JwtConfig;

/// Default maximum upload size: 25 MiB.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for the dispatcher to stop (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Maximum accepted request body for uploads, in bytes.
    pub max_upload_bytes: usize,
    /// Directory where uploaded artifacts are stored.
    pub upload_dir: PathBuf,
    /// JWT validation settings.
    pub jwt: JwtConfig,
    /// Analysis worker settings.
    pub worker: WorkerConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `MAX_UPLOAD_BYTES`     | `26214400` (25 MiB)        |
    /// | `UPLOAD_DIR`           | `uploads`                  |
    ///
    /// JWT and worker settings are read by [`JwtConfig::from_env`] and
    /// [`WorkerConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_BYTES.to_string())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let upload_dir = std::env::var("UPLOAD_DIR")
            .unwrap_or_else(|_| "uploads".into())
            .into();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            max_upload_bytes,
            upload_dir,
            jwt: JwtConfig::from_env(),
            worker: WorkerConfig::from_env(),
        }
    }
}

/// How the analysis worker is launched and how many run at once.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Executable to run (default: `python`).
    pub program: String,
    /// Script passed before the artifact path. Empty `WORKER_SCRIPT` means none.
    pub script: Option<String>,
    /// Working directory for the worker; defaults to the script's directory.
    pub working_dir: Option<PathBuf>,
    /// Maximum worker runtime in seconds; `0` disables the limit.
    pub timeout_secs: u64,
    /// Maximum number of concurrently running workers.
    pub concurrency: usize,
    /// Number of accepted jobs that may wait for a free worker slot.
    pub queue_capacity: usize,
}

impl WorkerConfig {
    /// Load worker settings from environment variables with defaults.
    ///
    /// | Env Var                   | Default                     |
    /// |---------------------------|-----------------------------|
    /// | `WORKER_PROGRAM`          | `python`                    |
    /// | `WORKER_SCRIPT`           | `scripts/predict_risk.py`   |
    /// | `WORKER_WORKING_DIR`      | directory of the script     |
    /// | `WORKER_TIMEOUT_SECS`     | `600`                       |
    /// | `WORKER_CONCURRENCY`      | `2`                         |
    /// | `DISPATCH_QUEUE_CAPACITY` | `64`                        |
    pub fn from_env() -> Self {
        let program = std::env::var("WORKER_PROGRAM").unwrap_or_else(|_| "python".into());

        let script = Some(
            std::env::var("WORKER_SCRIPT").unwrap_or_else(|_| "scripts/predict_risk.py".into()),
        )
        .filter(|s| !s.trim().is_empty());

        let working_dir = std::env::var("WORKER_WORKING_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                script
                    .as_deref()
                    .map(PathBuf::from)
                    .and_then(|p| p.parent().map(PathBuf::from))
                    .filter(|p| !p.as_os_str().is_empty())
            });

        let timeout_secs: u64 = std::env::var("WORKER_TIMEOUT_SECS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .expect("WORKER_TIMEOUT_SECS must be a valid u64");

        let concurrency: usize = std::env::var("WORKER_CONCURRENCY")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("WORKER_CONCURRENCY must be a valid usize");
        assert!(concurrency > 0, "WORKER_CONCURRENCY must be at least 1");

        let queue_capacity: usize = std::env::var("DISPATCH_QUEUE_CAPACITY")
            .unwrap_or_else(|_| "64".into())
            .parse()
            .expect("DISPATCH_QUEUE_CAPACITY must be a valid usize");
        assert!(queue_capacity > 0, "DISPATCH_QUEUE_CAPACITY must be at least 1");

        Self {
            program,
            script,
            working_dir,
            timeout_secs,
            concurrency,
            queue_capacity,
        }
    }

    /// Maximum runtime per worker, or `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Resolve the script path so it survives the working-directory change.
    pub fn command(&self) -> WorkerCommand {
        let script = self.script.as_ref().map(|s| {
            std::path::absolute(s)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| s.clone())
        });
        WorkerCommand {
            program: self.program.clone(),
            script,
            working_dir: self.working_dir.clone(),
            timeout: self.timeout(),
        }
    }
}
