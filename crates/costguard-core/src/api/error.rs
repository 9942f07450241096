use thiserror::Error;

/// Errors surfaced by the API transport.
///
/// Every status-derived variant keeps the raw response body so callers can
/// tell an expired token from an invalid one or a permission problem.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Unauthorized - token may be expired")]
    Unauthorized { body: String },

    #[error("Access denied: {body}")]
    AccessDenied { body: String },

    #[error("Resource not found: {body}")]
    NotFound { body: String },

    #[error("Rate limited - please wait before retrying")]
    RateLimited { body: String },

    #[error("Server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("HTTP error! status: {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// 2xx reply with `success: false`; carries the server's message.
    #[error("{0}")]
    Rejected(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized { body },
            403 => ApiError::AccessDenied { body },
            404 => ApiError::NotFound { body },
            429 => ApiError::RateLimited { body },
            code @ 500..=599 => ApiError::ServerError { status: code, body },
            code => ApiError::UnexpectedStatus { status: code, body },
        }
    }

    /// HTTP status code, when the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::AccessDenied { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::ServerError { status, .. } | ApiError::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            ApiError::Network(_) | ApiError::InvalidResponse(_) | ApiError::Rejected(_) => None,
        }
    }

    /// Raw (possibly truncated) response body, when the error came from a response.
    pub fn body(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { body }
            | ApiError::AccessDenied { body }
            | ApiError::NotFound { body }
            | ApiError::RateLimited { body }
            | ApiError::ServerError { body, .. }
            | ApiError::UnexpectedStatus { body, .. } => Some(body),
            ApiError::Network(_) | ApiError::InvalidResponse(_) | ApiError::Rejected(_) => None,
        }
    }

    /// 401 or 403: the server rejected the credential.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::AccessDenied { .. }
        )
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}
