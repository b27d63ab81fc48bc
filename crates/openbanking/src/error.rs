//! Provider error taxonomy.
//!
//! Every non-2xx response is classified by status into one
//! [`ProviderError`] variant carrying the provider's error code and message,
//! so callers decide on state transitions and retries without inspecting
//! raw bodies.

use std::time::Duration;

use serde::Deserialize;

/// Longest provider message kept on an error.
const MAX_MESSAGE_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Bad request (400): {message}")]
    BadRequest { code: Option<String>, message: String },

    #[error("Unauthorized (401): {message}")]
    Unauthorized { code: Option<String>, message: String },

    #[error("Forbidden (403): {message}")]
    Forbidden { code: Option<String>, message: String },

    #[error("Not found (404): {message}")]
    NotFound { code: Option<String>, message: String },

    #[error("Rate limited (429): {message}")]
    RateLimited {
        code: Option<String>,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider server error ({status}): {message}")]
    ServerError {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Unexpected provider response ({status}): {message}")]
    Unexpected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider transport error: {0}")]
    Transport(String),

    #[error("Malformed provider response: {0}")]
    Decode(String),

    #[error("Request cancelled")]
    Cancelled,
}

/// The error body shapes the provider uses: OAuth-style
/// `{error, error_description}` and envelope-style `{status, message, code}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<serde_json::Value>,
    error_description: Option<String>,
    code: Option<serde_json::Value>,
    error_code: Option<String>,
    message: Option<String>,
}

fn value_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    message
}

impl ProviderError {
    /// Classify a non-2xx response.
    pub fn from_response(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

        let code = parsed
            .error_code
            .clone()
            .or_else(|| parsed.code.as_ref().and_then(value_as_string))
            .or_else(|| parsed.error.as_ref().and_then(value_as_string));

        let message = parsed
            .error_description
            .or(parsed.message)
            .or_else(|| code.clone())
            .unwrap_or_else(|| format!("HTTP {status}"));
        let message = truncate(message);

        match status {
            400 => Self::BadRequest { code, message },
            401 => Self::Unauthorized { code, message },
            403 => Self::Forbidden { code, message },
            404 => Self::NotFound { code, message },
            429 => Self::RateLimited {
                code,
                message,
                retry_after,
            },
            500..=599 => Self::ServerError {
                status,
                code,
                message,
            },
            _ => Self::Unexpected {
                status,
                code,
                message,
            },
        }
    }

    /// HTTP status, when the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadRequest { .. } => Some(400),
            Self::Unauthorized { .. } => Some(401),
            Self::Forbidden { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::RateLimited { .. } => Some(429),
            Self::ServerError { status, .. } | Self::Unexpected { status, .. } => Some(*status),
            Self::Timeout | Self::Transport(_) | Self::Decode(_) | Self::Cancelled => None,
        }
    }

    /// Provider error code, if one was supplied.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::BadRequest { code, .. }
            | Self::Unauthorized { code, .. }
            | Self::Forbidden { code, .. }
            | Self::NotFound { code, .. }
            | Self::RateLimited { code, .. }
            | Self::ServerError { code, .. }
            | Self::Unexpected { code, .. } => code.as_deref(),
            Self::Timeout | Self::Transport(_) | Self::Decode(_) | Self::Cancelled => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// 5xx, timeouts and transport failures: retried with the server-error
    /// backoff.
    pub fn is_server_side(&self) -> bool {
        matches!(
            self,
            Self::ServerError { .. } | Self::Timeout | Self::Transport(_)
        )
    }

    /// Failures that say nothing about the connection's authorization.
    pub fn is_transient(&self) -> bool {
        self.is_rate_limited() || self.is_server_side()
    }

    /// Safe text for end users. Never includes provider bodies.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "Invalid request. Please check your input and try again.",
            Self::Unauthorized { .. } => {
                "Your banking connection has expired. Please reconnect your account."
            }
            Self::Forbidden { .. } => {
                "Access denied. You don't have permission to perform this action."
            }
            Self::NotFound { .. } => "The requested resource was not found.",
            Self::RateLimited { .. } => "Too many requests. Please wait a moment and try again.",
            Self::ServerError { .. } | Self::Timeout | Self::Transport(_) => {
                "Our banking service is temporarily unavailable. Please try again later."
            }
            Self::Unexpected { .. } | Self::Decode(_) | Self::Cancelled => {
                "An error occurred while processing your request."
            }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Outcome of polling the token endpoint during the device flow.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DevicePollError {
    /// The user has not approved yet; keep polling at the current interval.
    #[error("authorization pending")]
    AuthorizationPending,

    /// Polling too fast; double the interval.
    #[error("slow down")]
    SlowDown,

    /// The device code expired before approval.
    #[error("device code expired")]
    ExpiredToken,

    /// The user declined.
    #[error("access denied")]
    AccessDenied,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl DevicePollError {
    /// Map the OAuth device-flow error codes carried by a provider error.
    pub fn classify(err: ProviderError) -> Self {
        let device_code = match &err {
            ProviderError::BadRequest { code, .. }
            | ProviderError::Unauthorized { code, .. }
            | ProviderError::Forbidden { code, .. } => code.as_deref(),
            _ => None,
        };
        match device_code {
            Some("authorization_pending") => Self::AuthorizationPending,
            Some("slow_down") => Self::SlowDown,
            Some("expired_token") => Self::ExpiredToken,
            Some("access_denied") => Self::AccessDenied,
            _ => Self::Provider(err),
        }
    }
}
