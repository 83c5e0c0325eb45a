//! Session-authenticated client for the upstream thread API.
//!
//! [`ApiClient`] owns the session. Callers only ever ask for a thread; the
//! client decides when to authenticate, renew, or redispatch.

use chrono::Duration;
use http::header::{HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH};
use http::StatusCode;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::UpstreamConfig;
use crate::error::{ApiError, AuthError, TransportError};
use crate::transport::{body, HttpTransport, Transport, UpstreamResponse};

pub mod response;
pub mod session;
pub mod signer;
pub mod types;

pub use self::response::Outcome;
pub use self::session::{Clock, Session, SessionState, SystemClock};
pub use self::signer::Credentials;
pub use self::types::{Identity, RequestHeaders, ThreadRequest};

const SESSION_MARKER: &str = "SESSION-ID=Monazilla/1.00:";
const KEY_LENGTH_REPLY: &str = "appkey incorrect length";

struct SessionSlot {
    session: Session,
    identity: Option<Identity>,
}

pub struct ApiClient {
    credentials: Credentials,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    session_max_age: Duration,
    max_redispatch: u32,
    // Held across the check-and-renew decision so an expiry triggers one renewal.
    slot: Mutex<SessionSlot>,
}

impl ApiClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::builder(&config.base_url)
            .max_retries(config.max_retries)
            .request_timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .edge_servers(config.edge_servers.clone())
            .build()?;

        Ok(Self::with_transport(
            config,
            Arc::new(transport),
            Arc::new(SystemClock),
        ))
    }

    pub fn with_transport(
        config: &UpstreamConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let max_age = i64::try_from(config.session_max_age_secs).unwrap_or(i64::MAX / 1000);
        Self {
            credentials: Credentials::new(&config.app_key, &config.hmac_key),
            transport,
            clock,
            session_max_age: Duration::seconds(max_age),
            max_redispatch: config.max_redispatch,
            slot: Mutex::new(SessionSlot {
                session: Session::Unauthenticated,
                identity: None,
            }),
        }
    }

    pub async fn session_state(&self) -> SessionState {
        let slot = self.slot.lock().await;
        slot.session.state(self.clock.now())
    }

    pub async fn session_token(&self) -> Option<String> {
        let slot = self.slot.lock().await;
        slot.session.token().map(str::to_string)
    }

    /// Log in with `user`/`pass` (empty user means anonymous). The identity is
    /// remembered for later renewals even when this login fails; a failure
    /// leaves the current session as is.
    pub async fn authenticate(&self, user: &str, pass: &str) -> Result<(), AuthError> {
        let mut slot = self.slot.lock().await;
        slot.identity = Identity::new(user, pass);
        let identity = slot.identity.clone();

        let session = self.login(identity.as_ref()).await?;
        info!(
            user = identity.as_ref().map(|i| i.user.as_str()).unwrap_or(""),
            expires_at = ?session.expires_at(),
            "Authenticated with upstream API"
        );
        slot.session = session;
        Ok(())
    }

    /// Fetch a thread dat file.
    ///
    /// When the caller sends neither `Range` nor `Accept-Encoding`, gzip is
    /// requested upstream and transparently decoded on the way back.
    pub async fn fetch_thread(
        &self,
        thread: &ThreadRequest,
        headers: &RequestHeaders,
    ) -> Result<UpstreamResponse, ApiError> {
        let mut headers = headers.clone();
        let inject_gzip = headers.range.is_none() && headers.accept_encoding.is_none();
        if inject_gzip {
            headers.accept_encoding = Some(HeaderValue::from_static("gzip"));
        }

        let mut last_status = StatusCode::BAD_GATEWAY;
        for attempt in 0..=self.max_redispatch {
            let token = self.current_token().await?;
            let request = self.credentials.thread_request(thread, &token, &headers);
            let reply = self.transport.execute(request).await?;

            match response::interpret_response(&reply) {
                Outcome::Deliver => {
                    debug!(%thread, status = %reply.status, "Thread delivered");
                    return Ok(if inject_gzip {
                        decode_gzip(reply)
                    } else {
                        reply
                    });
                }
                Outcome::SessionRejected => {
                    warn!(%thread, attempt, "Session rejected by upstream, resetting");
                    self.slot.lock().await.session.invalidate_token(&token);
                    last_status = reply.status;
                }
                Outcome::Retry => {
                    debug!(%thread, attempt, status = %reply.status, "Redispatching thread fetch");
                    last_status = reply.status;
                }
                Outcome::Fail(err) => {
                    debug!(%thread, error = %err, "Thread fetch failed");
                    return Err(err);
                }
            }
        }

        warn!(%thread, status = %last_status, "Redispatch limit reached");
        Err(ApiError::UnexpectedStatus(last_status))
    }

    async fn current_token(&self) -> Result<String, ApiError> {
        let mut slot = self.slot.lock().await;
        let now = self.clock.now();

        match slot.session.state(now) {
            SessionState::Authenticated | SessionState::Stale => {}
            SessionState::Unauthenticated => {
                let identity = slot.identity.clone();
                slot.session = self.login(identity.as_ref()).await?;
            }
            SessionState::Expired => {
                let identity = slot.identity.clone();
                match self.login(identity.as_ref()).await {
                    Ok(session) => {
                        info!(expires_at = ?session.expires_at(), "Session renewed");
                        slot.session = session;
                    }
                    Err(err) => {
                        let retry_at = now + self.session_max_age;
                        warn!(error = %err, %retry_at, "Session renewal failed, reusing previous token");
                        slot.session.degrade(retry_at);
                    }
                }
            }
        }

        slot.session
            .token()
            .map(str::to_string)
            .ok_or(ApiError::Auth(AuthError::Malformed))
    }

    async fn login(&self, identity: Option<&Identity>) -> Result<Session, AuthError> {
        let now = self.clock.now();
        let request = self.credentials.auth_request(identity, now.timestamp());
        let response = self.transport.execute(request).await?;
        let status = response.status;
        let body = response.bytes().await.map_err(TransportError::Body)?;

        let token = parse_session_reply(&body).map_err(|err| {
            debug!(%status, error = %err, "Authentication reply rejected");
            err
        })?;
        Ok(Session::authenticated(token, now + self.session_max_age))
    }
}

fn parse_session_reply(body: &[u8]) -> Result<String, AuthError> {
    let text = String::from_utf8_lossy(body);
    match text.strip_prefix(SESSION_MARKER) {
        Some(rest) => {
            let token = rest.trim_end_matches(['\r', '\n']);
            if token.is_empty() {
                Err(AuthError::Malformed)
            } else {
                Ok(token.to_string())
            }
        }
        None if text.contains(KEY_LENGTH_REPLY) => Err(AuthError::KeyLength),
        None => Err(AuthError::Rejected(text.trim().chars().take(200).collect())),
    }
}

fn decode_gzip(mut response: UpstreamResponse) -> UpstreamResponse {
    let gzipped = response
        .header_str(CONTENT_ENCODING.as_str())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"));
    if !gzipped {
        return response;
    }

    response.headers.remove(CONTENT_ENCODING);
    response.headers.remove(CONTENT_LENGTH);
    response.body = body::gunzip(response.body);
    response
}
