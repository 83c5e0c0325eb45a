use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::fmt;

use crate::error::TransportError;

pub mod body;
pub mod executor;

pub use self::body::BodyStream;
pub use self::executor::{HttpTransport, HttpTransportBuilder};

/// A signed request ready to be POSTed to the upstream API.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// Path relative to the upstream base URL, e.g. `/v1/auth/`.
    pub path: String,
    pub headers: HeaderMap,
    /// Form-encoded body.
    pub body: String,
}

/// Response head plus a streaming body.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Value of a header as text, if present and valid UTF-8.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Buffer the whole body. Only meant for small payloads such as the
    /// authentication reply.
    pub async fn bytes(self) -> std::io::Result<Bytes> {
        body::collect(self.body).await
    }
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError>;
}
