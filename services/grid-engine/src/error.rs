//! Error taxonomy for the engine

use crate::guard::GuardRejection;
use crate::translator::TranslationError;

/// Errors surfaced by the engine and its collaborators
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing credential or capability; the engine cannot start
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid engine settings: {0}")]
    InvalidSettings(String),

    #[error("invalid wallet address: {0}")]
    InvalidWallet(String),

    /// Network, auth or rate-limit failure from an external service
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// Response did not match the expected shape; `raw` keeps the body for diagnosis
    #[error("{service} returned an unusable response: {message}")]
    Parse {
        service: &'static str,
        message: String,
        raw: String,
    },

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error("wrong network: expected chain id {expected}, signer is on {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("execution blocked: {0}")]
    Guard(#[from] GuardRejection),

    #[error("no active strategy to execute")]
    NoActiveStrategy,

    #[error("active strategy was already executed")]
    AlreadyExecuted,

    #[error("engine task is not running")]
    EngineStopped,
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Map a reqwest failure into a transport error, keeping timeout/connect detail
    pub fn transport(service: &'static str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };

        EngineError::Transport {
            service,
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// Map a non-success HTTP status into a transport error
    pub fn http_status(service: &'static str, status: reqwest::StatusCode, body: &str) -> Self {
        let message = match status {
            reqwest::StatusCode::UNAUTHORIZED => "invalid API credentials".to_string(),
            reqwest::StatusCode::NOT_FOUND => "resource not found".to_string(),
            reqwest::StatusCode::TOO_MANY_REQUESTS => {
                "rate limit exceeded, try again later".to_string()
            }
            _ => format!("{} - {}", status, body),
        };

        EngineError::Transport {
            service,
            status: Some(status.as_u16()),
            message,
        }
    }

    /// Transport and parse failures abort only the current cycle; anything
    /// else stops the engine
    pub fn is_cycle_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Transport { .. } | EngineError::Parse { .. } | EngineError::InvalidWallet(_)
        )
    }

    /// Raw advisory response attached to a parse failure
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            EngineError::Parse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Configuration(err.to_string())
    }
}
