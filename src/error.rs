//! GPT Buddy Error Types
//!
//! Every failure in the dispatch loop maps onto one of these variants.
//! Only `Adapter` (and `Config` at startup) is fatal; the rest are turned
//! into an outcome by the component that produced them.

use thiserror::Error;

/// Central error type for GPT Buddy
#[derive(Error, Debug)]
pub enum BuddyError {
    #[error("Audio/hotword adapter error: {0}")]
    Adapter(String),

    #[error("Speech was not recognized")]
    RecognitionFailure,

    #[error("Could not classify utterance: {0}")]
    ClassificationAmbiguous(String),

    #[error("Backend did not answer within {0:?}")]
    BackendTimeout(std::time::Duration),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Background task failed: {0}")]
    TaskFailure(String),

    #[error("Presentation error: {0}")]
    Presentation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event {event:?} is not accepted in state {state:?}")]
    InvalidTransition {
        state: crate::controller::SessionState,
        event: crate::controller::SessionEvent,
    },

    #[error("Controller is shutting down")]
    ShuttingDown,

    #[error("Task cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for GPT Buddy operations
pub type BuddyResult<T> = Result<T, BuddyError>;

impl BuddyError {
    /// Whether the loop has to stop because of this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, BuddyError::Adapter(_) | BuddyError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_adapter_and_config_are_fatal() {
        assert!(BuddyError::Adapter("mic gone".into()).is_fatal());
        assert!(BuddyError::Config("no key".into()).is_fatal());
        assert!(!BuddyError::RecognitionFailure.is_fatal());
        assert!(!BuddyError::Backend("500".into()).is_fatal());
        assert!(!BuddyError::TaskFailure("disk full".into()).is_fatal());
        assert!(!BuddyError::Presentation("missing".into()).is_fatal());
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BuddyError = io.into();
        assert!(matches!(err, BuddyError::Io(_)));
    }
}
