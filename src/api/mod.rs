//! Coaching backend API plumbing
//!
//! All backend calls go through [`ApiClient`], which attaches the bearer
//! credential, sends the request over an [`HttpTransport`], and sorts the
//! outcome into the error taxonomy the practice view needs:
//! - transport failure (the server was never reached) -> `ConnectivityFailure`
//! - HTTP 401/403, or no credential at all -> `Unauthenticated` (login redirect)
//! - any other non-2xx -> `ApplicationRejection` with the server's message

pub mod auth;
pub mod multipart;
pub mod ureq_transport;

#[cfg(test)]
pub(crate) mod mock;

use crate::error::ApiError;
use multipart::MultipartForm;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub use auth::{AuthContext, LoginRedirect};
pub use ureq_transport::UreqTransport;

/// HTTP method used by the backend endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Request body
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Multipart(MultipartForm),
}

/// A request relative to the backend base URL
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path plus optional query string, e.g. "/api/speech/analyze"
    pub path: String,
    pub bearer: Option<String>,
    pub body: RequestBody,
}

/// A response that made it back from the server, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// The request could not be delivered (DNS, refused connection, timeout, TLS)
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Trait for HTTP transports
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request. Non-2xx statuses are returned as responses; only
    /// delivery failures are errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Backend endpoint paths
pub mod endpoints {
    use urlencoding::encode;

    pub const SPEECH_ANALYZE: &str = "/api/speech/analyze";

    pub fn personalized_exercises(user_id: &str) -> String {
        format!("/api/ai/exercises/{}", encode(user_id))
    }

    pub fn recommendations(user_id: &str) -> String {
        format!("/api/exercises/recommendations/{}", encode(user_id))
    }

    pub fn active_exercises(user_id: &str) -> String {
        format!("/api/ai/exercises/{}/active", encode(user_id))
    }

    pub fn generate_weekly_plan(user_id: &str) -> String {
        format!("/api/ai/generate-weekly-plan/{}", encode(user_id))
    }

    pub fn generate_exercise(user_id: &str, exercise_type: &str) -> String {
        format!(
            "/api/ai/generate-exercise/{}?exerciseType={}",
            encode(user_id),
            encode(exercise_type)
        )
    }

    pub fn complete_exercise(exercise_id: &str, performance_score: Option<u8>) -> String {
        let base = format!("/api/ai/exercises/{}/complete", encode(exercise_id));
        match performance_score {
            Some(score) => format!("{}?performanceScore={}", base, score),
            None => base,
        }
    }
}

/// Sort a response into success or one of the API error kinds
pub fn classify(response: HttpResponse, fallback: &str) -> Result<HttpResponse, ApiError> {
    match response.status {
        200..=299 => Ok(response),
        401 | 403 => Err(ApiError::Unauthenticated {
            status: Some(response.status),
        }),
        status => {
            let message =
                rejection_message(&response.body).unwrap_or_else(|| fallback.to_string());
            Err(ApiError::rejection(Some(status), message))
        }
    }
}

/// Pull `message` out of a structured error body
fn rejection_message(body: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(body).ok()?;
    json.get("message")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Authenticated client for the coaching backend
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    auth: AuthContext,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, auth: AuthContext) -> Self {
        Self { transport, auth }
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub async fn get(&self, path: &str, fallback: &str) -> Result<HttpResponse, ApiError> {
        self.send(Method::Get, path, RequestBody::Empty, fallback)
            .await
    }

    pub async fn post(
        &self,
        path: &str,
        body: RequestBody,
        fallback: &str,
    ) -> Result<HttpResponse, ApiError> {
        self.send(Method::Post, path, body, fallback).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        fallback: &str,
    ) -> Result<HttpResponse, ApiError> {
        let Some(token) = self.auth.token() else {
            tracing::debug!("No credential for {} {}", method, path);
            self.auth.expire(None);
            return Err(ApiError::Unauthenticated { status: None });
        };

        let request = HttpRequest {
            method,
            path: path.to_string(),
            bearer: Some(token),
            body,
        };

        tracing::debug!("{} {}", method, path);
        let response = self.transport.send(request).await.map_err(|e| {
            tracing::warn!("{} {} did not reach the server: {}", method, path, e);
            ApiError::ConnectivityFailure(e.0)
        })?;
        tracing::trace!(
            "{} {} -> {} ({} bytes)",
            method,
            path,
            response.status,
            response.body.len()
        );

        let outcome = classify(response, fallback);
        if let Err(ApiError::Unauthenticated { status }) = &outcome {
            self.auth.expire(*status);
        }
        outcome
    }
}
