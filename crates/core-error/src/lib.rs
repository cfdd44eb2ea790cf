use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Provider-side classification of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    RateLimited,
    Timeout,
    Server,
    Network,
    PermissionDenied,
    QuotaExceeded,
    InvalidQuery,
    NotFound,
    Malformed,
}

impl FetchErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Timeout | Self::Server | Self::Network
        )
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RateLimited => "rate limited",
            Self::Timeout => "timeout",
            Self::Server => "server error",
            Self::Network => "network",
            Self::PermissionDenied => "permission denied",
            Self::QuotaExceeded => "quota exceeded",
            Self::InvalidQuery => "invalid query",
            Self::NotFound => "not found",
            Self::Malformed => "malformed response",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transient fetch error ({kind}): {message}")]
    Transient { kind: FetchErrorKind, message: String },

    #[error("fetch error ({kind}): {message}")]
    Fetch { kind: FetchErrorKind, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(field: &'static str, msg: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: msg.into(),
        }
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Builds a provider failure, picking the transient or fatal variant from `kind`.
    pub fn provider(kind: FetchErrorKind, msg: impl Into<String>) -> Self {
        let message = msg.into();
        if kind.is_transient() {
            Self::Transient { kind, message }
        } else {
            Self::Fetch { kind, message }
        }
    }

    pub fn fatal(kind: FetchErrorKind, msg: impl Into<String>) -> Self {
        Self::Fetch {
            kind,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::fatal(FetchErrorKind::NotFound, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn kind(&self) -> Option<FetchErrorKind> {
        match self {
            Self::Transient { kind, .. } | Self::Fetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Turns an exhausted transient failure into a fatal one, keeping the last provider message.
    pub fn escalate(self, attempts: u32) -> Self {
        match self {
            Self::Transient { kind, message } => Self::Fetch {
                kind,
                message: format!("gave up after {attempts} attempts: {message}"),
            },
            other => other,
        }
    }
}

/// What a partial-result warning refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum WarningSubject {
    Message(String),
    Label(String),
}

impl fmt::Display for WarningSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(id) => write!(f, "message {id}"),
            Self::Label(id) => write!(f, "label {id}"),
        }
    }
}

/// Non-fatal failure attached to an otherwise successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub subject: WarningSubject,
    pub reason: String,
}

impl Warning {
    pub fn message(id: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            subject: WarningSubject::Message(id.into()),
            reason: reason.to_string(),
        }
    }

    pub fn label(id: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            subject: WarningSubject::Label(id.into()),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.reason)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
    pub retryable: bool,
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        let (code, field, suggestion, retryable) = match err {
            EngineError::Validation { field, .. } => (
                "VALIDATION_ERROR",
                Some(*field),
                Some(validation_hint(field)),
                false,
            ),
            EngineError::Auth(_) => (
                "AUTH_ERROR",
                None,
                Some("Re-run the Gmail OAuth setup to refresh the token, then retry"),
                false,
            ),
            EngineError::Transient { .. } => (
                "FETCH_TRANSIENT",
                None,
                Some("Gmail is throttling or unavailable. Wait a moment and try again"),
                true,
            ),
            EngineError::Fetch { kind, .. } => match kind {
                FetchErrorKind::NotFound => (
                    "NOT_FOUND",
                    None,
                    Some("Use an ID from a previous listing or search result"),
                    false,
                ),
                FetchErrorKind::InvalidQuery => (
                    "FETCH_ERROR",
                    None,
                    Some("Gmail rejected the query. Check the search operators"),
                    false,
                ),
                FetchErrorKind::PermissionDenied | FetchErrorKind::QuotaExceeded => (
                    "FETCH_ERROR",
                    None,
                    Some("Check the Gmail API is enabled and the project quota"),
                    false,
                ),
                _ => ("FETCH_ERROR", None, None, false),
            },
            EngineError::Internal(_) => ("INTERNAL_ERROR", None, Some("Unexpected error"), true),
        };
        Self {
            code,
            message: err.to_string(),
            field,
            suggestion,
            retryable,
        }
    }
}

fn validation_hint(field: &str) -> &'static str {
    match field {
        "sender" => "Pass a plain address like name@example.com",
        "start_date" | "end_date" => "Use YYYY-MM-DD dates with start on or before end",
        "flags" => "Known flags: unread, read, starred, important, has-attachment, inbox, sent",
        "filter" => "Set at least one of sender, subject, dates, text or flags",
        "message_id" => "Pass the ID shown in a listing or search result",
        "query" => "Pass a Gmail search string such as 'is:unread from:name@example.com'",
        _ => "Fix the named field and retry",
    }
}

impl ErrorResponse {
    pub fn to_compact(&self) -> String {
        let mut parts = vec![format!("[{}] {}", self.code, self.message)];
        if let Some(s) = self.suggestion {
            parts.push(format!("Suggestion: {s}"));
        }
        if self.retryable {
            parts.push("(retryable)".to_string());
        }
        parts.join(" | ")
    }
}
