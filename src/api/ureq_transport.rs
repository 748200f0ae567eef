//! HTTP transport built on ureq
//!
//! ureq is blocking, so each request runs on tokio's blocking pool and the
//! caller only awaits the join handle.

use super::{HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, TransportError};
use crate::config::ApiConfig;
use crate::error::SpeechCoachError;
use std::io::Read;
use std::time::Duration;

/// Largest response body we are willing to buffer
const MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

/// Transport that talks to the coaching backend over HTTP(S)
pub struct UreqTransport {
    base_url: String,
    agent: ureq::Agent,
    timeout: Duration,
}

impl UreqTransport {
    /// Create a transport from config
    pub fn new(config: &ApiConfig) -> Result<Self, SpeechCoachError> {
        config.validate()?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();

        tracing::info!(
            "Configured backend: base_url={}, timeout={}s",
            config.base_url,
            timeout.as_secs()
        );

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            agent,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait::async_trait]
impl HttpTransport for UreqTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        let url = self.url(&request.path);

        tokio::task::spawn_blocking(move || send_blocking(&agent, &url, request))
            .await
            .map_err(|e| TransportError(format!("Request task failed: {}", e)))?
    }
}

fn send_blocking(
    agent: &ureq::Agent,
    url: &str,
    request: HttpRequest,
) -> Result<HttpResponse, TransportError> {
    let start = std::time::Instant::now();

    let mut call = match request.method {
        Method::Get => agent.get(url),
        Method::Post => agent.post(url),
    }
    .set("Accept", "application/json");

    if let Some(ref token) = request.bearer {
        call = call.set("Authorization", &format!("Bearer {}", token));
    }

    let result = match request.body {
        RequestBody::Empty => call.call(),
        RequestBody::Multipart(form) => {
            let body = form.encode();
            tracing::debug!("Uploading {} byte multipart body to {}", body.len(), url);
            call.set("Content-Type", &form.content_type())
                .send_bytes(&body)
        }
    };

    let response = match result {
        Ok(response) => response,
        // Non-2xx: the server answered, hand the response back for classification
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(t)) => {
            return Err(TransportError(format!("Request failed: {}", t)));
        }
    };

    let status = response.status();
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut body)
        .map_err(|e| TransportError(format!("Failed to read response: {}", e)))?;

    tracing::debug!(
        "{} {} -> {} in {:.2}s",
        request.method,
        url,
        status,
        start.elapsed().as_secs_f32()
    );

    Ok(HttpResponse { status, body })
}
