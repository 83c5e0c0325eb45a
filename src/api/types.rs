use http::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, IF_MODIFIED_SINCE, RANGE};
use std::fmt;

/// Identifies a single thread on the upstream: `/v1/<server>/<board>/<thread_key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRequest {
    pub server: String,
    pub board: String,
    pub thread_key: String,
}

impl ThreadRequest {
    pub fn new(
        server: impl Into<String>,
        board: impl Into<String>,
        thread_key: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            board: board.into(),
            thread_key: thread_key.into(),
        }
    }

    pub fn path(&self) -> String {
        format!("/v1/{}/{}/{}", self.server, self.board, self.thread_key)
    }
}

impl fmt::Display for ThreadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.server, self.board, self.thread_key)
    }
}

/// Conditional and encoding headers carried from the inbound request into the
/// signed fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    pub if_modified_since: Option<HeaderValue>,
    pub range: Option<HeaderValue>,
    pub accept_encoding: Option<HeaderValue>,
}

impl RequestHeaders {
    pub fn has_range(&self) -> bool {
        self.range.is_some()
    }

    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = &self.if_modified_since {
            headers.insert(IF_MODIFIED_SINCE, value.clone());
        }
        if let Some(value) = &self.range {
            headers.insert(RANGE, value.clone());
        }
        if let Some(value) = &self.accept_encoding {
            headers.insert(ACCEPT_ENCODING, value.clone());
        }
        headers
    }
}

/// Login identity used to (re)authenticate the session.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub pass: String,
}

impl Identity {
    /// Returns `None` for the anonymous identity (empty user).
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Option<Self> {
        let user = user.into();
        if user.is_empty() {
            return None;
        }
        Some(Self {
            user,
            pass: pass.into(),
        })
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}
