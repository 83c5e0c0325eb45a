use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use http::{HeaderMap, HeaderValue, StatusCode};
use std::sync::Mutex;

use crate::api::session::Clock;
use crate::error::TransportError;
use crate::transport::{body, Transport, UpstreamRequest, UpstreamResponse};

type Handler =
    Box<dyn Fn(&UpstreamRequest) -> Result<UpstreamResponse, TransportError> + Send + Sync>;

/// Transport double that answers through a closure and records every request.
pub struct MockTransport {
    handler: Handler,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&UpstreamRequest) -> Result<UpstreamResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        // Yield so concurrent callers interleave like they would on a socket.
        tokio::task::yield_now().await;
        (self.handler)(&request)
    }
}

pub fn response(status: u16, headers: &[(&str, &str)], data: &'static [u8]) -> UpstreamResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    UpstreamResponse::new(
        StatusCode::from_u16(status).unwrap(),
        map,
        body::full(data),
    )
}

pub fn session_reply(token: &str) -> UpstreamResponse {
    let data = format!("SESSION-ID=Monazilla/1.00:{token}\n");
    UpstreamResponse::new(StatusCode::OK, HeaderMap::new(), body::full(data))
}

/// Extract the `sid` form field from a thread request body.
pub fn sid_of(request: &UpstreamRequest) -> Option<String> {
    url::form_urlencoded::parse(request.body.as_bytes())
        .find(|(k, _)| k == "sid")
        .map(|(_, v)| v.into_owned())
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
