use chrono::{DateTime, Utc};

/// Source of wall-clock time. Swapped for a manual clock in tests.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Observable lifecycle of the session at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    /// Renewal failed and the previous token is being reused until `retry_at`.
    Stale,
    Expired,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    Unauthenticated,
    Authenticated {
        token: String,
        expires_at: DateTime<Utc>,
    },
    Stale {
        token: String,
        retry_at: DateTime<Utc>,
    },
}

impl Session {
    pub fn authenticated(token: String, expires_at: DateTime<Utc>) -> Self {
        Session::Authenticated { token, expires_at }
    }

    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        match self {
            Session::Unauthenticated => SessionState::Unauthenticated,
            Session::Authenticated { expires_at, .. } if now >= *expires_at => {
                SessionState::Expired
            }
            Session::Authenticated { .. } => SessionState::Authenticated,
            Session::Stale { retry_at, .. } if now >= *retry_at => SessionState::Expired,
            Session::Stale { .. } => SessionState::Stale,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Session::Unauthenticated => None,
            Session::Authenticated { token, .. } | Session::Stale { token, .. } => Some(token),
        }
    }

    /// Deadline after which a renewal is attempted.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Session::Unauthenticated => None,
            Session::Authenticated { expires_at, .. } => Some(*expires_at),
            Session::Stale { retry_at, .. } => Some(*retry_at),
        }
    }

    /// Keep serving the current token until `retry_at`. Returns `false` when
    /// there is no token to fall back on.
    pub fn degrade(&mut self, retry_at: DateTime<Utc>) -> bool {
        match self.token() {
            Some(token) => {
                *self = Session::Stale {
                    token: token.to_string(),
                    retry_at,
                };
                true
            }
            None => false,
        }
    }

    /// Drop the session if it still holds `token`. A token that was already
    /// replaced by a concurrent renewal is left alone.
    pub fn invalidate_token(&mut self, token: &str) -> bool {
        if self.token() == Some(token) {
            *self = Session::Unauthenticated;
            true
        } else {
            false
        }
    }
}
