//! Request signing for the upstream API.
//!
//! Both operations sign with HMAC-SHA256 keyed by the HMAC key and send the
//! hex digest in the form body. Nothing here touches the network or the clock;
//! callers pass in the timestamp and session token.

use hmac::{Hmac, Mac};
use http::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use sha2::Sha256;
use std::fmt;

use super::types::{Identity, RequestHeaders, ThreadRequest};
use crate::transport::UpstreamRequest;

type HmacSha256 = Hmac<Sha256>;

pub const AUTH_PATH: &str = "/v1/auth/";

const API_ACCEPT: &str = "text/html, */*";
const API_USER_AGENT: &str = "Mozilla/3.0 (compatible; JaneStyle/3.83)";
const API_CLIENT_UA: &str = "JaneStyle/3.83";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// The app key / HMAC key pair issued for the API.
#[derive(Clone)]
pub struct Credentials {
    app_key: String,
    hmac_key: String,
}

impl Credentials {
    pub fn new(app_key: impl Into<String>, hmac_key: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            hmac_key: hmac_key.into(),
        }
    }

    /// Hex-encoded HMAC-SHA256 of `payload`.
    pub fn sign(&self, payload: &str) -> String {
        let mut mac = match HmacSha256::new_from_slice(self.hmac_key.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
        };
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Build the authentication request. `identity` is `None` in anonymous mode.
    pub fn auth_request(&self, identity: Option<&Identity>, timestamp: i64) -> UpstreamRequest {
        let ct = timestamp.to_string();
        let hb = self.sign(&format!("{}{}", self.app_key, ct));
        let (user, pass) = identity
            .map(|id| (id.user.as_str(), id.pass.as_str()))
            .unwrap_or(("", ""));

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("ID", user)
            .append_pair("PW", pass)
            .append_pair("KY", &self.app_key)
            .append_pair("CT", &ct)
            .append_pair("HB", &hb)
            .finish();

        let mut headers = base_headers();
        headers.insert("x-2ch-ua", HeaderValue::from_static(API_CLIENT_UA));

        UpstreamRequest {
            path: AUTH_PATH.to_string(),
            headers,
            body,
        }
    }

    /// Build the signed fetch request for a thread.
    pub fn thread_request(
        &self,
        thread: &ThreadRequest,
        session: &str,
        request_headers: &RequestHeaders,
    ) -> UpstreamRequest {
        let path = thread.path();
        let hobo = self.sign(&format!("{}{}{}", path, session, self.app_key));

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("sid", session)
            .append_pair("hobo", &hobo)
            .append_pair("appkey", &self.app_key)
            .finish();

        let mut headers = request_headers.to_header_map();
        headers.extend(base_headers());

        UpstreamRequest {
            path,
            headers,
            body,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &"<redacted>")
            .field("hmac_key", &"<redacted>")
            .finish()
    }
}

fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(API_ACCEPT));
    headers.insert(USER_AGENT, HeaderValue::from_static(API_USER_AGENT));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
    headers
}
