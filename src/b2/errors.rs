//! B2 failure classification
//!
//! Non-2xx responses carry a JSON body with `status`, `code` and `message`.
//! The status picks the variant; the code separates an expired token from
//! bad credentials.

use super::types::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum B2Error {
    #[error("authorization token expired")]
    AuthExpired,

    #[error("unauthorized ({code}): {message}")]
    Unauthorized { code: String, message: String },

    #[error("rate limited")]
    RateLimited,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("request rejected ({status} {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl B2Error {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            B2Error::AuthExpired
                | B2Error::RateLimited
                | B2Error::Server { .. }
                | B2Error::Timeout
                | B2Error::Transport(_)
        )
    }

    /// Classify an HTTP error response from its status and raw body
    pub fn from_response(status: u16, body: &str) -> Self {
        let ErrorBody { code, message } = serde_json::from_str::<ErrorBody>(body).unwrap_or_else(|_| ErrorBody {
            code: String::new(),
            message: body.to_string(),
        });

        match status {
            401 if code == "expired_auth_token" || code == "bad_auth_token" => B2Error::AuthExpired,
            401 => B2Error::Unauthorized { code, message },
            403 => B2Error::Forbidden(message),
            404 => B2Error::NotFound(message),
            408 => B2Error::Timeout,
            429 => B2Error::RateLimited,
            500..=599 => B2Error::Server { status, message },
            _ => B2Error::Rejected {
                status,
                code,
                message,
            },
        }
    }

    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            B2Error::Timeout
        } else if err.is_decode() {
            B2Error::Decode(err.to_string())
        } else {
            B2Error::Transport(err.to_string())
        }
    }
}
