//! Scripted transport and redirect recorder for unit tests

use super::auth::LoginRedirect;
use super::multipart::Part;
use super::{HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// What the transport saw for one request
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub parts: Vec<Part>,
}

impl RecordedRequest {
    pub fn field(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }
}

/// Transport returning queued responses per path; unknown paths get 404
#[derive(Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Result<HttpResponse, TransportError>>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, status: u16, body: serde_json::Value) {
        self.push(path, Ok(HttpResponse::new(status, body.to_string())));
    }

    pub fn respond_raw(&self, path: &str, status: u16, body: &str) {
        self.push(path, Ok(HttpResponse::new(status, body)));
    }

    pub fn fail(&self, path: &str, message: &str) {
        self.push(path, Err(TransportError(message.to_string())));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    fn push(&self, path: &str, outcome: Result<HttpResponse, TransportError>) {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(outcome);
    }
}

#[async_trait::async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let parts = match &request.body {
            RequestBody::Empty => Vec::new(),
            RequestBody::Multipart(form) => form.parts().to_vec(),
        };
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method,
            path: request.path.clone(),
            bearer: request.bearer.clone(),
            parts,
        });

        self.routes
            .lock()
            .unwrap()
            .get_mut(&request.path)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Ok(HttpResponse::new(
                    404,
                    serde_json::json!({"message": "Not found"}).to_string(),
                ))
            })
    }
}

/// Redirect hook that remembers where it was sent
#[derive(Default)]
pub(crate) struct RecordingRedirect {
    calls: Mutex<Vec<String>>,
}

impl RecordingRedirect {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl LoginRedirect for RecordingRedirect {
    fn redirect_to_login(&self, login_url: &str) {
        self.calls.lock().unwrap().push(login_url.to_string());
    }
}
