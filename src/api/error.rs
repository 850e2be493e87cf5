use thiserror::Error;

use crate::oauth::SignError;
use crate::util::BodyError;

/// Maximum number of response-body bytes kept on an [`ApiError::HttpStatus`].
const MAX_ERROR_BODY: usize = 512;

/// Errors surfaced by [`super::ApiClient`].
///
/// None of these are fatal to the process: callers translate them into
/// "attempted but not succeeded" (curation) or `false` (publishing).
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(reqwest::Error),
    /// The transport timeout elapsed before a response arrived
    #[error("Request timed out")]
    Timeout,
    /// Non-2xx response; `body` carries the platform's explanation (rate
    /// limit, duplicate status, bad credentials...)
    #[error("HTTP error: status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    /// Response body was not the JSON shape we expected
    #[error("Unexpected response: {0}")]
    Decode(String),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Connection dropped before the announced body length arrived
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The request could not be signed
    #[error("Signing failed: {0}")]
    Signing(#[from] SignError),
}

impl ApiError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(err)
        }
    }

    pub(crate) fn from_body(err: BodyError) -> Self {
        match err {
            BodyError::Network(e) => Self::from_reqwest(e),
            BodyError::TooLarge => ApiError::ResponseTooLarge,
            BodyError::Incomplete { expected, received } => {
                ApiError::IncompleteResponse { expected, received }
            }
        }
    }

    pub(crate) fn http_status(status: u16, body: &[u8]) -> Self {
        let end = body.len().min(MAX_ERROR_BODY);
        ApiError::HttpStatus {
            status,
            body: String::from_utf8_lossy(&body[..end]).into_owned(),
        }
    }

    /// HTTP 429, the platform's rate-limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::HttpStatus { status: 429, .. })
    }
}
