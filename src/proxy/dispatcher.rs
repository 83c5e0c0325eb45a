use bytes::Bytes;
use http::header::{HeaderValue, ACCEPT_ENCODING, IF_MODIFIED_SINCE, RANGE};
use http::{HeaderMap, Request, Response, StatusCode};
use hyper::body::Body;
use std::sync::Arc;
use tracing::{debug, warn};

use super::forward::{strip_hop_by_hop, Forwarder};
use super::router::{request_url, DatRouter};
use super::{empty_body, stream_body, ProxyBody};
use crate::api::{ApiClient, RequestHeaders, ThreadRequest};
use crate::error::{ConfigError, FailureKind, Result};

/// Sends dat-file requests through the signed API and everything else to the
/// pass-through forwarder.
pub struct Dispatcher {
    router: DatRouter,
    client: Arc<ApiClient>,
    forwarder: Forwarder,
}

impl Dispatcher {
    pub fn new(client: Arc<ApiClient>, forwarder: Forwarder) -> Result<Self> {
        let router = DatRouter::new().map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(Self {
            router,
            client,
            forwarder,
        })
    }

    pub async fn dispatch<B>(&self, req: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let thread = request_url(req.uri(), req.headers())
            .and_then(|url| self.router.match_url(&url));

        match thread {
            Some(thread) => self.serve_thread(&thread, req.headers()).await,
            None => self.forwarder.forward(req).await,
        }
    }

    pub async fn serve_thread(
        &self,
        thread: &ThreadRequest,
        inbound: &HeaderMap,
    ) -> Response<ProxyBody> {
        let headers = thread_headers(inbound);

        match self.client.fetch_thread(thread, &headers).await {
            Ok(upstream) => {
                debug!(%thread, status = %upstream.status, "Serving thread from API");
                let mut response = Response::new(stream_body(upstream.body));
                *response.status_mut() = upstream.status;
                *response.headers_mut() = upstream.headers;
                strip_hop_by_hop(response.headers_mut());
                response
            }
            Err(err) => {
                let kind = err.kind();
                let status = failure_status(kind, headers.has_range());
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    warn!(%thread, ?kind, error = %err, "Thread fetch failed");
                } else {
                    debug!(%thread, ?kind, %status, "Thread unavailable");
                }
                status_response(status)
            }
        }
    }
}

/// Headers forwarded into the signed fetch. A `Range` request is passed
/// through verbatim; otherwise any `Accept-Encoding` becomes plain `gzip`.
pub fn thread_headers(inbound: &HeaderMap) -> RequestHeaders {
    let range = inbound.get(RANGE).cloned();
    let accept_encoding = if range.is_none() && inbound.contains_key(ACCEPT_ENCODING) {
        Some(HeaderValue::from_static("gzip"))
    } else {
        None
    };

    RequestHeaders {
        if_modified_since: inbound.get(IF_MODIFIED_SINCE).cloned(),
        range,
        accept_encoding,
    }
}

pub fn failure_status(kind: FailureKind, has_range: bool) -> StatusCode {
    match kind {
        FailureKind::NotFoundOrInvalidRange if has_range => StatusCode::RANGE_NOT_SATISFIABLE,
        FailureKind::NotFoundOrInvalidRange | FailureKind::ThreadClosed => StatusCode::FOUND,
        FailureKind::Forbidden
        | FailureKind::TransportExhausted
        | FailureKind::AuthFailed
        | FailureKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn status_response(status: StatusCode) -> Response<ProxyBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = status;
    response
}
