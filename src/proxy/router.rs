use http::header::HOST;
use http::{HeaderMap, Uri};
use regex::Regex;

use crate::api::ThreadRequest;

const DAT_PATTERN: &str = r"^http://([0-9A-Za-z_]+)\.(?:2ch\.net|bbspink\.com)(?::80)?/([0-9A-Za-z_]+)/dat/([0-9]+)\.dat";

/// Recognizes thread dat-file URLs.
#[derive(Debug, Clone)]
pub struct DatRouter {
    pattern: Regex,
}

impl DatRouter {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(DAT_PATTERN)?,
        })
    }

    /// Extract the thread coordinates from a dat URL. Only a prefix of the URL
    /// has to match, so query strings and trailing path segments are ignored.
    pub fn match_url(&self, url: &str) -> Option<ThreadRequest> {
        let caps = self.pattern.captures(url)?;
        Some(ThreadRequest::new(&caps[1], &caps[2], &caps[3]))
    }
}

/// Full URL of an inbound request. Proxy clients send the absolute form;
/// origin-form requests are rebuilt from the `Host` header.
pub fn request_url(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    if uri.scheme().is_some() {
        return Some(uri.to_string());
    }

    let host = headers.get(HOST)?.to_str().ok()?;
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Some(format!("http://{host}{path}"))
}
