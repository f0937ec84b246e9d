//! Shared helpers for API integration tests.
//!
//! Tests run against the full router with an in-memory job store, a
//! temporary upload directory and a shell script standing in for the
//! analysis worker.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use clauselens_api::auth::jwt::{generate_access_token, JwtConfig};
use clauselens_api::config::{ServerConfig, WorkerConfig};
use clauselens_api::engine::JobDispatcher;
use clauselens_api::router::build_app_router;
use clauselens_api::state::AppState;
use clauselens_core::analysis::AnalysisResult;
use clauselens_core::artifact::LocalArtifactStore;
use clauselens_core::job::{ElevatedJob, Job, NewJob, OwnerProfile};
use clauselens_core::store::{JobStore, MemoryJobStore, StoreError};
use clauselens_core::types::{DbId, JobId};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

const BOUNDARY: &str = "clauselens-test-boundary";

/// Worker that prints log noise around a valid NDA analysis.
pub const NDA_WORKER: &str = r#"
echo "loading model..."
echo '{"documentType":"NDA","documentTypeConfidence":91,"overallRisk":"Medium","riskPercentage":42,"clauses":[{"Clause_No":1,"Clause_Text":"The Recipient shall keep all information confidential.","Predicted_Risk":"Low","Confidence":88.5}]}'
echo "done"
"#;

// ---------------------------------------------------------------------------
// Store wrapper
// ---------------------------------------------------------------------------

/// [`MemoryJobStore`] that counts reads and can be told to fail inserts.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryJobStore,
    reads: AtomicUsize,
    fail_creates: AtomicBool,
}

impl RecordingStore {
    /// Number of single-job reads (`get` and `get_elevated`) served.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_creates(&self) {
        self.fail_creates.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn create(&self, input: NewJob) -> Result<Job, StoreError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("insert rejected".into()));
        }
        self.inner.create(input).await
    }

    async fn get(&self, id: JobId, requesting_owner: DbId) -> Result<Job, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id, requesting_owner).await
    }

    async fn get_elevated(&self, id: JobId) -> Result<ElevatedJob, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_elevated(id).await
    }

    async fn set_processing(&self, id: JobId) -> Result<(), StoreError> {
        self.inner.set_processing(id).await
    }

    async fn set_completed(&self, id: JobId, result: &AnalysisResult) -> Result<(), StoreError> {
        self.inner.set_completed(id, result).await
    }

    async fn set_failed(&self, id: JobId, reason: &str) -> Result<(), StoreError> {
        self.inner.set_failed(id, reason).await
    }

    async fn list_by_owner(&self, owner: DbId) -> Result<Vec<Job>, StoreError> {
        self.inner.list_by_owner(owner).await
    }

    async fn fail_interrupted(&self, reason: &str) -> Result<u64, StoreError> {
        self.inner.fail_interrupted(reason).await
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Options for [`build_test_app_with`].
pub struct TestOptions {
    /// Shell script body run as the worker; the artifact path is `$1`.
    pub worker_script: String,
    pub concurrency: usize,
    pub queue_capacity: usize,
    /// Leave the dispatcher stopped so queued jobs stay queued.
    pub run_dispatcher: bool,
    /// Point the artifact store at a regular file so every write fails.
    pub broken_storage: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            worker_script: NDA_WORKER.to_string(),
            concurrency: 2,
            queue_capacity: 16,
            run_dispatcher: true,
            broken_storage: false,
        }
    }
}

/// A running test application and the resources it owns.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<RecordingStore>,
    pub upload_dir: PathBuf,
    cancel: CancellationToken,
    _dir: TempDir,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl TestApp {
    /// Files currently stored in the upload directory.
    pub fn stored_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.upload_dir) {
            Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn test_config(upload_dir: PathBuf, worker: WorkerConfig) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_upload_bytes: 1024 * 1024,
        upload_dir,
        jwt: JwtConfig {
            secret: TEST_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
        worker,
    }
}

/// Build the full application with a worker that prints an NDA analysis.
pub fn build_test_app() -> TestApp {
    build_test_app_with(TestOptions::default())
}

/// Build the full application router with all middleware layers, backed by
/// an in-memory store and a temporary upload directory.
pub fn build_test_app_with(options: TestOptions) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("worker.sh");
    std::fs::write(&script, &options.worker_script).expect("write worker script");

    let upload_dir = if options.broken_storage {
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, b"x").expect("write blocker file");
        blocker
    } else {
        dir.path().join("uploads")
    };

    let worker = WorkerConfig {
        program: "sh".to_string(),
        script: Some(script.to_string_lossy().into_owned()),
        working_dir: Some(dir.path().to_path_buf()),
        timeout_secs: 30,
        concurrency: options.concurrency,
        queue_capacity: options.queue_capacity,
    };
    let config = test_config(upload_dir.clone(), worker);

    let store = Arc::new(RecordingStore::default());
    let (dispatch, dispatcher) = JobDispatcher::new(
        store.clone(),
        config.worker.command(),
        config.worker.concurrency,
        config.worker.queue_capacity,
    );

    let cancel = CancellationToken::new();
    if options.run_dispatcher {
        tokio::spawn(dispatcher.run(cancel.clone()));
    } else {
        // Keep the receiving side open without draining it.
        let token = cancel.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            drop(dispatcher);
        });
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        store: store.clone(),
        artifacts: Arc::new(LocalArtifactStore::new(&upload_dir)),
        dispatch,
        pool: None,
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        upload_dir,
        cancel,
        _dir: dir,
    }
}

/// Register an owner profile as the account service would.
pub async fn register_owner(app: &TestApp, owner_id: DbId, name: &str, email: &str) {
    app.store
        .inner
        .register_owner(
            owner_id,
            OwnerProfile {
                name: Some(name.to_string()),
                email: Some(email.to_string()),
            },
        )
        .await;
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Access token for `user_id` with the given role.
pub fn token(user_id: DbId, role: &str) -> String {
    let config = JwtConfig {
        secret: TEST_SECRET.to_string(),
        access_token_expiry_mins: 15,
    };
    generate_access_token(user_id, role, &config).expect("token generation should succeed")
}

/// Encode a single multipart part named `field`.
pub fn multipart_body(field: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

/// POST a multipart body to `/api/v1/uploads`, optionally authenticated.
pub async fn post_multipart(app: &TestApp, token: Option<&str>, body: Vec<u8>) -> Response {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/uploads")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    send(app, builder.body(Body::from(body)).unwrap()).await
}

/// Upload `bytes` as the `file` part.
pub async fn upload(app: &TestApp, token: &str, file_name: &str, bytes: &[u8]) -> Response {
    post_multipart(app, Some(token), multipart_body("file", file_name, bytes)).await
}

/// Upload a document and return its `uploadId`, asserting success.
pub async fn upload_ok(app: &TestApp, token: &str, file_name: &str) -> String {
    let response = upload(app, token, file_name, b"%PDF-1.4 test document").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    json["uploadId"]
        .as_str()
        .expect("uploadId should be a string")
        .to_string()
}

pub async fn get(app: &TestApp, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn get_auth(app: &TestApp, uri: &str, token: &str) -> Response {
    let request = Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("response body should be JSON")
}

/// Poll an upload until it reaches `completed` or `failed`.
pub async fn poll_until_terminal(app: &TestApp, token: &str, upload_id: &str) -> serde_json::Value {
    let uri = format!("/api/v1/uploads/{upload_id}");
    for _ in 0..200 {
        let response = get_auth(app, &uri, token).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if json["state"] == "completed" || json["state"] == "failed" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("upload {upload_id} did not reach a terminal state");
}
