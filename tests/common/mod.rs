//! Shared fixtures for integration tests: an in-process mock backend served
//! with axum and a scripted microphone.

#![allow(dead_code)]

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use speechcoach::api::{ApiClient, AuthContext, LoginRedirect, UreqTransport};
use speechcoach::capture::{
    AcquiredStream, CaptureConstraints, CaptureEvent, MediaDevices, StreamControl,
};
use speechcoach::config::ApiConfig;
use speechcoach::CaptureError;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

pub const USER_ID: &str = "7";
pub const TOKEN: &str = "test-token";

/// One multipart upload received by the analyze endpoint
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub audio: Option<Vec<u8>>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub exercise_id: Option<String>,
    pub user_id: Option<String>,
}

struct BackendState {
    token: String,
    personalized: Mutex<(u16, Value)>,
    recommendations: Mutex<(u16, Value)>,
    analyze: Mutex<(u16, Value)>,
    generate: Mutex<(u16, Value)>,
    hits: Mutex<Vec<String>>,
    uploads: Mutex<Vec<Upload>>,
}

impl BackendState {
    fn hit(&self, what: String) {
        self.hits.lock().unwrap().push(what);
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {}", self.token))
    }

    fn reply(slot: &Mutex<(u16, Value)>) -> Response {
        let (status, body) = slot.lock().unwrap().clone();
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Unauthorized", "message": "Invalid token"})),
    )
        .into_response()
}

/// Coaching backend double listening on a random local port
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState {
            token: TOKEN.to_string(),
            personalized: Mutex::new((200, json!({"exercises": []}))),
            recommendations: Mutex::new((200, json!([]))),
            analyze: Mutex::new((200, json!({"overallScore": 0}))),
            generate: Mutex::new((404, json!({"message": "Not configured"}))),
            hits: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/ai/exercises/:user", get(personalized))
            .route("/api/exercises/recommendations/:user", get(recommendations))
            .route("/api/speech/analyze", post(analyze))
            .route("/api/ai/exercises/:id/complete", post(complete))
            .route("/api/ai/generate-exercise/:user", post(generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_personalized(&self, status: u16, body: Value) {
        *self.state.personalized.lock().unwrap() = (status, body);
    }

    pub fn set_recommendations(&self, status: u16, body: Value) {
        *self.state.recommendations.lock().unwrap() = (status, body);
    }

    pub fn set_analyze(&self, status: u16, body: Value) {
        *self.state.analyze.lock().unwrap() = (status, body);
    }

    pub fn set_generate(&self, status: u16, body: Value) {
        *self.state.generate.lock().unwrap() = (status, body);
    }

    /// Number of requests whose log entry starts with `prefix`
    pub fn hits(&self, prefix: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.starts_with(prefix))
            .count()
    }

    pub fn log(&self) -> Vec<String> {
        self.state.hits.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state.uploads.lock().unwrap().clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn personalized(
    State(state): State<Arc<BackendState>>,
    Path(user): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.hit(format!("personalized {}", user));
    if !state.authorized(&headers) {
        return unauthorized();
    }
    BackendState::reply(&state.personalized)
}

async fn recommendations(
    State(state): State<Arc<BackendState>>,
    Path(user): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.hit(format!("recommendations {}", user));
    if !state.authorized(&headers) {
        return unauthorized();
    }
    BackendState::reply(&state.recommendations)
}

async fn generate(
    State(state): State<Arc<BackendState>>,
    Path(user): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.hit(format!(
        "generate {} {}",
        user,
        query.get("exerciseType").map(String::as_str).unwrap_or("-")
    ));
    if !state.authorized(&headers) {
        return unauthorized();
    }
    BackendState::reply(&state.generate)
}

async fn complete(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.hit(format!(
        "complete {} {}",
        id,
        query
            .get("performanceScore")
            .map(String::as_str)
            .unwrap_or("-")
    ));
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"message": "Exercise completed"})).into_response()
}

async fn analyze(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    state.hit("analyze".to_string());
    if !state.authorized(&headers) {
        return unauthorized();
    }

    let mut upload = Upload::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"message": format!("Invalid multipart request: {}", e)})),
                )
                    .into_response()
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "audio" => {
                upload.file_name = field.file_name().map(str::to_string);
                upload.content_type = field.content_type().map(str::to_string);
                upload.audio = field.bytes().await.ok().map(|b| b.to_vec());
            }
            "exerciseId" => upload.exercise_id = field.text().await.ok(),
            "userId" => upload.user_id = field.text().await.ok(),
            _ => {}
        }
    }

    if upload.audio.as_ref().map_or(true, |a| a.is_empty()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Bad request", "message": "Audio file is required"})),
        )
            .into_response();
    }

    state.uploads.lock().unwrap().push(upload);
    BackendState::reply(&state.analyze)
}

/// Login redirect that only remembers where it would have gone
#[derive(Default)]
pub struct TestRedirect {
    calls: Mutex<Vec<String>>,
}

impl TestRedirect {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl LoginRedirect for TestRedirect {
    fn redirect_to_login(&self, login_url: &str) {
        self.calls.lock().unwrap().push(login_url.to_string());
    }
}

/// Real ureq-backed client pointed at `base_url`
pub fn api_client(base_url: &str, token: Option<&str>) -> (ApiClient, Arc<TestRedirect>) {
    let config = ApiConfig {
        base_url: base_url.to_string(),
        timeout_secs: 5,
        ..ApiConfig::default()
    };
    let transport = Arc::new(UreqTransport::new(&config).expect("valid test config"));
    let redirect = Arc::new(TestRedirect::default());
    let auth = AuthContext::new(USER_ID, config.login_url(), redirect.clone());
    if let Some(token) = token {
        auth.sign_in(token);
    }
    (ApiClient::new(transport, auth), redirect)
}

/// Microphone that plays back canned takes, one per acquisition
pub struct ScriptedDevices {
    takes: Mutex<VecDeque<Vec<Vec<u8>>>>,
    released: Arc<AtomicUsize>,
}

impl ScriptedDevices {
    pub fn new(takes: Vec<Vec<Vec<u8>>>) -> Arc<Self> {
        Arc::new(Self {
            takes: Mutex::new(takes.into()),
            released: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MediaDevices for ScriptedDevices {
    async fn acquire(
        &self,
        _constraints: &CaptureConstraints,
    ) -> Result<AcquiredStream, CaptureError> {
        let chunks = self
            .takes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CaptureError::DeviceNotFound("scripted".to_string()))?;

        let (tx, events) = mpsc::channel(chunks.len() + 2);
        for chunk in chunks {
            tx.try_send(CaptureEvent::Chunk(chunk)).unwrap();
        }

        Ok(AcquiredStream {
            events,
            control: Box::new(ScriptedControl {
                tx: Some(tx),
                released: self.released.clone(),
            }),
        })
    }
}

struct ScriptedControl {
    tx: Option<mpsc::Sender<CaptureEvent>>,
    released: Arc<AtomicUsize>,
}

impl StreamControl for ScriptedControl {
    fn stop(&mut self) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(CaptureEvent::Stopped);
        }
    }

    fn release(&mut self) {
        self.tx = None;
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
