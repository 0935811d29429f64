#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use dicom_gateway::config::GatewayConfig;
use dicom_gateway::services::job_service::JobService;
use dicom_gateway::services::jobs::{JobQueue, JobRegistry};
use dicom_gateway::services::processor::BatchProcessor;
use dicom_gateway::services::staging::{StagedJob, StagingService};
use dicom_gateway::services::worker::BackgroundWorker;
use dicom_gateway::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tower::ServiceExt;

pub const BOUNDARY: &str = "---------------------------9051914041544843365972754266";

/// One call observed by the mock processor
#[derive(Debug, Clone)]
pub struct Invocation {
    pub dir_path: String,
    pub csv_path: PathBuf,
    pub anonymize: bool,
    pub log_path: PathBuf,
    /// CSV bytes as seen at call time
    pub csv_content: Vec<u8>,
}

pub struct MockProcessor {
    calls: Mutex<Vec<Invocation>>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl MockProcessor {
    pub fn succeeding() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failure: None,
            delay: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::succeeding()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::succeeding()
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchProcessor for MockProcessor {
    async fn process_job(
        &self,
        dir_path: &str,
        csv_path: &Path,
        anonymize: bool,
        log_path: &Path,
    ) -> anyhow::Result<()> {
        let csv_content = tokio::fs::read(csv_path).await?;
        self.calls.lock().unwrap().push(Invocation {
            dir_path: dir_path.to_string(),
            csv_path: csv_path.to_path_buf(),
            anonymize,
            log_path: log_path.to_path_buf(),
            csv_content,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(message) => Err(anyhow::anyhow!(message.clone())),
            None => Ok(()),
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub processor: Arc<MockProcessor>,
    pub root: TempDir,
    pub shutdown: watch::Sender<bool>,
    /// Undrained queue when no worker was spawned
    pub pending: Option<mpsc::Receiver<StagedJob>>,
}

impl TestApp {
    pub async fn new(processor: MockProcessor) -> Self {
        Self::with_config(processor, |_| {}, true).await
    }

    /// Builds the app over a fresh temp directory. `customize` adjusts the
    /// config; `spawn_worker` controls whether queued jobs get drained.
    pub async fn with_config(
        processor: MockProcessor,
        customize: impl FnOnce(&mut GatewayConfig),
        spawn_worker: bool,
    ) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig {
            work_dir: root.path().join("work"),
            static_dir: root.path().join("static"),
            ..GatewayConfig::default()
        };
        customize(&mut config);

        let staging = Arc::new(StagingService::new(&config.work_dir));
        staging.ensure_root().await.unwrap();

        let processor = Arc::new(processor);
        let jobs = Arc::new(JobService::new(staging, processor.clone(), &config));
        let registry = JobRegistry::with_limit(config.max_job_records);
        let (queue, receiver) = JobQueue::new(config.job_queue_size);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let mut pending = None;
        if spawn_worker {
            let worker = BackgroundWorker::new(
                jobs.clone(),
                registry.clone(),
                receiver,
                shutdown_rx,
                &config,
            );
            tokio::spawn(worker.run());
        } else {
            pending = Some(receiver);
        }

        let state = AppState {
            config,
            jobs,
            registry,
            queue,
        };

        Self {
            app: create_app(state.clone()),
            state,
            processor,
            root,
            shutdown,
            pending,
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.state.config.work_dir.clone()
    }

    /// Job workspaces currently on disk
    pub fn workspaces(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.work_dir())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn post_form(&self, uri: &str, form: &MultipartForm) -> (StatusCode, Value) {
        let response = self.send(form.request(uri)).await;
        read_json(response).await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        read_json(response).await
    }

    pub async fn delete_json(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .send(
                Request::builder()
                    .method("DELETE")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        read_json(response).await
    }

    /// Polls a job until `done` accepts its record or five seconds pass
    pub async fn wait_for_job(&self, job_id: &str, done: impl Fn(&Value) -> bool) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let (status, body) = self.get_json(&format!("/jobs/{}", job_id)).await;
            assert_eq!(status, StatusCode::OK);
            if done(&body) {
                return body;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job never reached the expected state: {}",
                body
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or_else(|_| {
        panic!(
            "non-JSON body with status {}: {:?}",
            status,
            String::from_utf8_lossy(&body)
        )
    });
    (status, json)
}

/// Hand-built multipart/form-data body
#[derive(Default, Clone)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard form: dir_path, csv_file and anonymize_flag
    pub fn upload(dir_path: &str, filename: &str, csv: &str, anonymize: &str) -> Self {
        Self::new()
            .text("dir_path", dir_path)
            .file("csv_file", filename, csv.as_bytes())
            .text("anonymize_flag", anonymize)
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn request(&self, uri: &str) -> Request<Body> {
        let mut body = self.body.clone();
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }
}
