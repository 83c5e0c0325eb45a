use http::StatusCode;

use crate::error::ApiError;
use crate::transport::UpstreamResponse;

pub const THREAD_STATUS: &str = "thread-status";

/// What to do with an upstream reply to a thread fetch.
#[derive(Debug)]
pub enum Outcome {
    Deliver,
    /// The session token was refused; reset it and dispatch again.
    SessionRejected,
    /// Transient upstream failure; dispatch again.
    Retry,
    Fail(ApiError),
}

/// `Thread-Status` takes precedence over the HTTP status.
pub fn interpret(status: StatusCode, thread_status: Option<&str>) -> Outcome {
    match thread_status.map(str::trim) {
        Some("0") => return Outcome::Fail(ApiError::NotFoundOrInvalidRange),
        Some("1") => return Outcome::Deliver,
        Some("8") => return Outcome::Fail(ApiError::ThreadClosed),
        _ => {}
    }

    match status {
        StatusCode::UNAUTHORIZED => Outcome::SessionRejected,
        StatusCode::BAD_GATEWAY => Outcome::Retry,
        other => Outcome::Fail(ApiError::UnexpectedStatus(other)),
    }
}

pub fn interpret_response(response: &UpstreamResponse) -> Outcome {
    interpret(response.status, response.header_str(THREAD_STATUS))
}
