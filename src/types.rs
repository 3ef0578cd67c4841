use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the Download Station client and the backend around it.
///
/// The type is `Clone` because a single login outcome is handed to every
/// caller waiting on the same in-flight login.
#[derive(Debug, Clone, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Login failed ({code}): {message}")]
    Auth { code: i64, message: String },

    /// Session rejected by the NAS. Handled inside the client by logging in
    /// again; callers only see it converted into [`MonitorError::Api`].
    #[error("Session expired ({code})")]
    SessionExpired { code: i64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("Download Station error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl MonitorError {
    /// Transport-level failure that may succeed once connectivity is back.
    pub fn is_transient(&self) -> bool {
        matches!(self, MonitorError::Network(_) | MonitorError::Timeout(_))
    }

    /// Error code reported by the NAS, if any.
    pub fn code(&self) -> Option<i64> {
        match self {
            MonitorError::Auth { code, .. }
            | MonitorError::SessionExpired { code }
            | MonitorError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_network_and_timeout() {
        assert!(MonitorError::Network("refused".into()).is_transient());
        assert!(MonitorError::Timeout(Duration::from_secs(10)).is_transient());
        assert!(!MonitorError::Config("no host".into()).is_transient());
        assert!(!MonitorError::Api {
            code: 101,
            message: "Invalid parameter".into()
        }
        .is_transient());
    }

    #[test]
    fn timeout_message_mentions_duration() {
        let err = MonitorError::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "Request timed out after 10s");
    }

    #[test]
    fn code_is_exposed_for_server_errors() {
        assert_eq!(MonitorError::SessionExpired { code: 105 }.code(), Some(105));
        assert_eq!(MonitorError::Network("x".into()).code(), None);
    }
}
