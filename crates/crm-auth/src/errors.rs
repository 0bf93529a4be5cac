use std::collections::BTreeMap;

use thiserror::Error;

/// CRM client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{message}")]
    AuthFailure { message: String },

    #[error("{message}")]
    ValidationFailure {
        message: String,
        fields: BTreeMap<String, String>,
    },

    #[error("{message}")]
    Unauthorized { message: String },

    #[error("Session refresh failed: {message}")]
    RefreshFailure { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("Missing refresh token - cannot refresh session")]
    MissingRefreshToken,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token store is locked by another process")]
    LockTimeout,

    #[error("Token store is corrupted or was sealed with a different key")]
    CorruptedStore,

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("No passphrase available for the token store")]
    UserCancelled,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Coarse classification surfaced to callers that only need to branch on
/// the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    AuthFailure,
    ValidationFailure,
    Unauthorized,
    RefreshFailure,
    Conflict,
    Other,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::AuthFailure { .. } => ErrorKind::AuthFailure,
            Self::ValidationFailure { .. } => ErrorKind::ValidationFailure,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::RefreshFailure { .. } | Self::MissingRefreshToken => ErrorKind::RefreshFailure,
            Self::Conflict { .. } => ErrorKind::Conflict,
            _ => ErrorKind::Other,
        }
    }

    /// Human-readable message suitable for showing next to a form
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(e) if e.is_timeout() => {
                "The server took too long to respond. Please try again.".to_string()
            }
            Self::Network(_) => "Network error. Please check your connection.".to_string(),
            Self::AuthFailure { message }
            | Self::ValidationFailure { message, .. }
            | Self::Unauthorized { message }
            | Self::Conflict { message } => message.clone(),
            Self::RefreshFailure { .. } | Self::MissingRefreshToken => {
                "Your session has expired. Please log in again.".to_string()
            }
            other => other.to_string(),
        }
    }

    pub(crate) fn refresh_failure(message: impl Into<String>) -> Self {
        Self::RefreshFailure {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_taxonomy() {
        let conflict = ClientError::Conflict {
            message: "Username already exists".to_string(),
        };
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert_eq!(ClientError::MissingRefreshToken.kind(), ErrorKind::RefreshFailure);
        assert_eq!(ClientError::LockTimeout.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_user_message_prefers_server_message() {
        let err = ClientError::AuthFailure {
            message: "Invalid username or password".to_string(),
        };
        assert_eq!(err.user_message(), "Invalid username or password");

        let err = ClientError::refresh_failure("HTTP 401");
        assert_eq!(
            err.user_message(),
            "Your session has expired. Please log in again."
        );
    }
}
