use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use http::{HeaderMap, StatusCode};
use reqwest::Client;
use tracing::{debug, warn};

use super::{BodyStream, Transport, UpstreamRequest, UpstreamResponse};
use crate::error::TransportError;

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP executor for signed upstream requests.
///
/// Retries timeouts with a doubling per-attempt deadline, and retries
/// 400/500/502 answers only when they come from an allow-listed edge server.
/// A 403 is returned immediately as [`TransportError::Forbidden`].
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    max_retries: u32,
    request_timeout: Duration,
    edge_servers: Vec<String>,
}

impl HttpTransport {
    pub fn builder(base_url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder::new(base_url)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn is_edge_server(&self, headers: &HeaderMap) -> bool {
        let Some(server) = headers
            .get(http::header::SERVER)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };
        let server = server.to_ascii_lowercase();
        self.edge_servers
            .iter()
            .any(|edge| server.starts_with(&edge.to_ascii_lowercase()))
    }
}

fn is_edge_retry_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::INTERNAL_SERVER_ERROR | StatusCode::BAD_GATEWAY
    )
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let url = self.url(&request.path);
        let attempts = self.max_retries.saturating_add(1);
        let mut timeout = self.request_timeout;

        for attempt in 1..=attempts {
            let outgoing = self
                .client
                .post(&url)
                .headers(request.headers.clone())
                .body(request.body.clone())
                .build()
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

            debug!(
                attempt,
                %url,
                timeout_ms = timeout.as_millis() as u64,
                "sending upstream request"
            );

            let response = match tokio::time::timeout(timeout, self.client.execute(outgoing)).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) if err.is_timeout() => {
                    warn!(attempt, %url, error = %err, "upstream request timed out");
                    timeout = timeout.saturating_mul(2);
                    continue;
                }
                Ok(Err(err)) => {
                    warn!(attempt, %url, error = %err, "upstream request failed");
                    return Err(TransportError::Request(err.to_string()));
                }
                Err(_) => {
                    warn!(attempt, %url, timeout_ms = timeout.as_millis() as u64, "upstream request timed out");
                    timeout = timeout.saturating_mul(2);
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::FORBIDDEN {
                warn!(%url, "upstream returned 403");
                return Err(TransportError::Forbidden);
            }

            if is_edge_retry_status(status) && self.is_edge_server(response.headers()) {
                debug!(attempt, %url, %status, "transient edge error, retrying");
                continue;
            }

            debug!(attempt, %url, %status, "received upstream response");
            let headers = response.headers().clone();
            let body: BodyStream = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
            return Ok(UpstreamResponse::new(status, headers, body));
        }

        Err(TransportError::Exhausted { attempts })
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug)]
pub struct HttpTransportBuilder {
    base_url: String,
    max_retries: u32,
    request_timeout: Duration,
    edge_servers: Vec<String>,
}

impl HttpTransportBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            edge_servers: vec!["cloudflare".to_string()],
        }
    }

    /// Number of additional attempts after the first one.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Deadline for the first attempt; doubled after every timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn edge_servers(mut self, servers: Vec<String>) -> Self {
        self.edge_servers = servers;
        self
    }

    pub fn build(self) -> Result<HttpTransport, TransportError> {
        // The upstream expects one request per connection.
        let client = Client::builder()
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(HttpTransport {
            client,
            base_url: self.base_url,
            max_retries: self.max_retries,
            request_timeout: self.request_timeout,
            edge_servers: self.edge_servers,
        })
    }
}
