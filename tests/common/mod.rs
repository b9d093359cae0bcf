#![allow(dead_code)]

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Request, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::post,
};
use http_body_util::BodyExt;
use promptshot::application::capture::ImageCapturer;
use promptshot::application::ports::{PageRasterizer, RasterizeError, Viewport};
use promptshot::application::relay::RelayService;
use promptshot::config::{CaptureSettings, UpstreamSettings, WrongMethodStatus};
use promptshot::infra::artifacts::ArtifactStorage;
use promptshot::infra::http::{RelayState, build_router};
use promptshot::infra::upstream::ReqwestCompletionClient;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};
use url::Url;

pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
pub const HELLO_FINGERPRINT: &str = "5d41402abc4b2a76b9719d911017c592";

/// Recorded call to the upstream stub.
#[derive(Debug, Clone)]
pub struct UpstreamCall {
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

#[derive(Clone)]
enum Reply {
    Fixed(serde_json::Value),
    /// Answer content names the requested model.
    PerModel,
}

/// Answer the upstream stub gives for `model` when built with [`UpstreamStub::per_model`].
pub fn answer_for_model(model: &str) -> String {
    format!("# answer from `{model}`\n\nrendered for {model} only")
}

fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

#[derive(Clone)]
struct UpstreamStubState {
    status: StatusCode,
    reply: Reply,
    calls: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<UpstreamCall>>>,
}

/// A chat-completion endpoint bound to an ephemeral local port.
pub struct UpstreamStub {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<UpstreamCall>>>,
}

impl UpstreamStub {
    pub async fn start(status: StatusCode, reply: serde_json::Value) -> Self {
        Self::spawn(status, Reply::Fixed(reply)).await
    }

    pub async fn per_model() -> Self {
        Self::spawn(StatusCode::OK, Reply::PerModel).await
    }

    async fn spawn(status: StatusCode, reply: Reply) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let state = UpstreamStubState {
            status,
            reply,
            calls: calls.clone(),
            log: log.clone(),
        };
        let app = Router::new()
            .route("/api/paas/v4/chat/completions", post(completions))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind upstream stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("upstream stub serves");
        });

        Self { addr, calls, log }
    }

    pub async fn answering(content: &str) -> Self {
        Self::start(StatusCode::OK, completion(content)).await
    }

    pub fn endpoint(&self) -> Url {
        Url::parse(&format!(
            "http://{}/api/paas/v4/chat/completions",
            self.addr
        ))
        .expect("stub url")
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<UpstreamCall> {
        self.log.lock().expect("lock").clone()
    }
}

async fn completions(
    State(state): State<UpstreamStubState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let body: serde_json::Value =
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let reply = match &state.reply {
        Reply::Fixed(reply) => reply.clone(),
        Reply::PerModel => completion(&answer_for_model(
            body["model"].as_str().unwrap_or_default(),
        )),
    };
    state.log.lock().expect("lock").push(UpstreamCall {
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned),
        body,
    });
    (state.status, Json(reply)).into_response()
}

/// Rasterizer returning a PNG signature followed by the document itself.
pub struct StubRasterizer {
    pub captures: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl StubRasterizer {
    pub fn immediate() -> Arc<Self> {
        Arc::new(Self {
            captures: AtomicUsize::new(0),
            gate: None,
        })
    }

    pub fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            captures: AtomicUsize::new(0),
            gate: Some(gate),
        })
    }
}

#[async_trait]
impl PageRasterizer for StubRasterizer {
    async fn rasterize(
        &self,
        html: &str,
        _viewport: Viewport,
        deadline: Instant,
    ) -> Result<Vec<u8>, RasterizeError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.gate.as_ref() {
            timeout_at(deadline, gate.notified())
                .await
                .map_err(|_| RasterizeError::DeadlineExceeded)?;
        }
        Ok(stub_png(html))
    }
}

/// Bytes [`StubRasterizer`] produces for `html`.
pub fn stub_png(html: &str) -> Vec<u8> {
    let mut png = PNG_MAGIC.to_vec();
    png.extend_from_slice(html.as_bytes());
    png
}

pub struct HarnessOptions {
    pub wrong_method_status: WrongMethodStatus,
    pub serve_images: bool,
    pub max_concurrent: u32,
    pub queue_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            wrong_method_status: WrongMethodStatus::NotFound,
            serve_images: true,
            max_concurrent: 2,
            queue_timeout: Duration::from_secs(5),
            max_body_bytes: 1024 * 1024,
        }
    }
}

pub fn capture_settings(max_concurrent: u32, queue_timeout: Duration) -> CaptureSettings {
    CaptureSettings {
        browser_executable: None,
        viewport_width: NonZeroU32::new(780).expect("non-zero"),
        viewport_height: NonZeroU32::new(2600).expect("non-zero"),
        max_concurrent: NonZeroU32::new(max_concurrent).expect("non-zero"),
        queue_timeout,
        render_timeout: Duration::from_secs(10),
        no_sandbox: false,
    }
}

pub fn router(
    publish_dir: &Path,
    endpoint: Url,
    rasterizer: Arc<dyn PageRasterizer>,
    options: HarnessOptions,
) -> Router {
    let upstream = ReqwestCompletionClient::new(&UpstreamSettings {
        endpoint,
        timeout: Duration::from_secs(10),
        connect_timeout: Duration::from_secs(5),
    })
    .expect("upstream client");
    let storage =
        ArtifactStorage::new(publish_dir.to_path_buf(), "http://localhost").expect("storage");
    let capturer = ImageCapturer::new(
        rasterizer,
        storage,
        &capture_settings(options.max_concurrent, options.queue_timeout),
    );
    let relay = Arc::new(RelayService::new(Arc::new(upstream), capturer));

    build_router(RelayState {
        relay,
        wrong_method_status: options.wrong_method_status,
        max_body_bytes: options.max_body_bytes,
        serve_images: options.serve_images,
    })
}

pub fn post_api(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub async fn read_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn read_bytes(response: Response) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
}

pub fn published_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("list publish dir")
        .map(|entry| {
            entry
                .expect("entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}
