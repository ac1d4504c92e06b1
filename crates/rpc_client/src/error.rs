//! Transport errors and their retry classification.
//!
//! Providers do not agree on how they report throttling, outages or fee
//! rejections, so classification runs in two passes: structured signals first
//! (HTTP status, JSON-RPC code, reqwest's timeout/connect flags), then keyword
//! matching on the message text. The keyword tables are a compatibility
//! fallback only; provider wording is not a stable contract and the lists are
//! not exhaustive.

use chainpilot_core::CoreError;
use thiserror::Error;

/// Result type for transport operations.
pub type RpcResult<T> = std::result::Result<T, RpcError>;

/// JSON-RPC code some providers use for "limit exceeded".
pub const LIMIT_EXCEEDED_CODE: i64 = -32005;

const QUOTA_MARKERS: &[&str] = &["tenderly", "virtual"];

const RATE_LIMIT_KEYWORDS: &[&str] = &["429", "rate limit", "too many requests", "ratelimit"];

const CONNECTIVITY_KEYWORDS: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "connection error",
    "connection aborted",
    "name resolution",
    "dns",
    "no route to host",
    "network unreachable",
    "max retries exceeded",
    "read timeout",
    "connect timeout",
    "remote end closed",
    "broken pipe",
];

const SERVER_KEYWORDS: &[&str] = &[
    "500",
    "502",
    "503",
    "504",
    "internal server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
];

const FEE_KEYWORDS: &[&str] = &["intrinsic gas too low", "feetoolow", "gas limit", "underpriced"];

/// How a failure should be treated by the retry layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A metered provider refused service for the rest of the session.
    QuotaExceeded,
    /// The endpoint is throttling us.
    RateLimited,
    /// Timeouts, resets, DNS and routing failures.
    Connectivity,
    /// 5xx-class upstream failures.
    UpstreamServer,
    /// Fee or gas rejections that a fresh estimate can fix.
    FeeRelated,
    /// Anything else; not retried.
    Unclassified,
}

/// Errors returned by a [`Transport`](crate::Transport).
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    /// Non-success HTTP status.
    #[error("http status {status}: {body}")]
    Http {
        /// Status code
        status: u16,
        /// Response body or reason
        body: String,
    },

    /// The request never produced an HTTP response.
    #[error("transport error: {message}")]
    Transport {
        /// Error text
        message: String,
        /// The request timed out
        timeout: bool,
        /// The connection could not be established
        connect: bool,
    },

    /// The node answered with a JSON-RPC error object.
    #[error("json-rpc error {code}: {message}")]
    JsonRpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
    },

    /// The response could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    /// Creates an invalid-response error.
    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Creates a JSON-RPC error.
    pub fn json_rpc<S: Into<String>>(code: i64, message: S) -> Self {
        Self::JsonRpc {
            code,
            message: message.into(),
        }
    }

    /// Classifies this error for the retry layer.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http { status, body } => {
                let text = body.to_ascii_lowercase();
                if *status == 403 && QUOTA_MARKERS.iter().any(|m| text.contains(m)) {
                    ErrorKind::QuotaExceeded
                } else if *status == 429 {
                    ErrorKind::RateLimited
                } else if (500..600).contains(status) {
                    ErrorKind::UpstreamServer
                } else {
                    classify_message(&format!("{status} {text}"))
                }
            }
            Self::Transport {
                message,
                timeout,
                connect,
            } => {
                if *timeout || *connect {
                    return ErrorKind::Connectivity;
                }
                match classify_message(message) {
                    ErrorKind::Unclassified => ErrorKind::Connectivity,
                    kind => kind,
                }
            }
            Self::JsonRpc { code, message } => {
                if *code == LIMIT_EXCEEDED_CODE || *code == 429 {
                    ErrorKind::RateLimited
                } else {
                    classify_message(message)
                }
            }
            Self::InvalidResponse(message) => classify_message(message),
        }
    }
}

/// Keyword fallback classification of an opaque error message.
#[must_use]
pub fn classify_message(message: &str) -> ErrorKind {
    let text = message.to_ascii_lowercase();
    let has_any = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

    if text.contains("403") && text.contains("forbidden") && has_any(QUOTA_MARKERS) {
        ErrorKind::QuotaExceeded
    } else if has_any(RATE_LIMIT_KEYWORDS) {
        ErrorKind::RateLimited
    } else if has_any(CONNECTIVITY_KEYWORDS) {
        ErrorKind::Connectivity
    } else if has_any(SERVER_KEYWORDS) {
        ErrorKind::UpstreamServer
    } else if has_any(FEE_KEYWORDS) {
        ErrorKind::FeeRelated
    } else {
        ErrorKind::Unclassified
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        Self::Transport {
            message: err.to_string(),
            timeout: err.is_timeout(),
            connect: err.is_connect(),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl From<CoreError> for RpcError {
    fn from(err: CoreError) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
