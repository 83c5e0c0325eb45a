use bytes::Bytes;
use futures::TryStreamExt;
use http::header::{HeaderName, HeaderValue, HOST, USER_AGENT};
use http::{HeaderMap, Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Body;
use reqwest::redirect::Policy;
use std::io;
use tracing::{debug, warn};

use super::dispatcher::status_response;
use super::router::request_url;
use super::{stream_body, ProxyBody};
use crate::error::TransportError;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
];

/// Remove connection-scoped headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(http::header::UPGRADE);
}

/// Plain reverse proxy for requests that are not thread dat files.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    user_agent: HeaderValue,
}

impl Forwarder {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|e| TransportError::InvalidRequest(format!("user agent: {e}")))?;
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self { client, user_agent })
    }

    pub async fn forward<B>(&self, req: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let Some(url) = request_url(&parts.uri, &parts.headers) else {
            debug!(uri = %parts.uri, "Request without a resolvable URL");
            return status_response(StatusCode::BAD_REQUEST);
        };

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(HOST);
        headers.insert(USER_AGENT, self.user_agent.clone());

        let mut outgoing = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers);
        if !body.is_end_stream() {
            outgoing = outgoing.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        match outgoing.send().await {
            Ok(upstream) => {
                debug!(method = %parts.method, %url, status = %upstream.status(), "Forwarded request");
                let status = upstream.status();
                let mut headers = upstream.headers().clone();
                strip_hop_by_hop(&mut headers);

                let body = Box::pin(upstream.bytes_stream().map_err(io::Error::other));
                let mut response = Response::new(stream_body(body));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            Err(err) => {
                warn!(method = %parts.method, %url, error = %err, "Forwarding failed");
                status_response(StatusCode::BAD_GATEWAY)
            }
        }
    }
}
