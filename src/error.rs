use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Environment variable error: {0}")]
    EnvVar(String),
}

/// Failures raised while talking to the upstream API over HTTP.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The upstream refused access. Never retried.
    #[error("Forbidden by upstream")]
    Forbidden,

    #[error("Retries exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to read response body: {0}")]
    Body(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("appkey incorrect length")]
    KeyLength,

    #[error("Authentication rejected: {0}")]
    Rejected(String),

    #[error("Malformed authentication response")]
    Malformed,

    #[error("Authentication transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Not found or invalid range request")]
    NotFoundOrInvalidRange,

    #[error("Thread is closed (dat-out)")]
    ThreadClosed,

    #[error("Unexpected upstream status: {0}")]
    UnexpectedStatus(http::StatusCode),
}

/// Normalized classification of a failed thread fetch.
///
/// The dispatcher maps each kind onto an outbound status code, so the
/// distinctions here must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NotFoundOrInvalidRange,
    ThreadClosed,
    Forbidden,
    TransportExhausted,
    AuthFailed,
    Unknown,
}

impl TransportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::Forbidden => FailureKind::Forbidden,
            TransportError::Exhausted { .. }
            | TransportError::Request(_)
            | TransportError::Body(_) => FailureKind::TransportExhausted,
            TransportError::InvalidRequest(_) => FailureKind::Unknown,
        }
    }
}

impl ApiError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ApiError::Auth(AuthError::Transport(err)) | ApiError::Transport(err) => err.kind(),
            ApiError::Auth(_) => FailureKind::AuthFailed,
            ApiError::NotFoundOrInvalidRange => FailureKind::NotFoundOrInvalidRange,
            ApiError::ThreadClosed => FailureKind::ThreadClosed,
            ApiError::UnexpectedStatus(_) => FailureKind::Unknown,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
