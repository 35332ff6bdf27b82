//! Error types for the talk table.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TalkTableError {
    #[error("Invalid participant count: expected at least {min}, got {actual}")]
    InvalidParticipantCount { min: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to resolve model '{model}': {reason}")]
    ModelLookup { model: String, reason: String },

    #[error("Model '{model}' failed during generation: {reason}")]
    ModelInvocation { model: String, reason: String },

    #[error("Transcript persistence error: {0}")]
    Persistence(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A second cancellation arrived while the operator was being asked
    /// whether to stop or continue.
    #[error("Session aborted by a repeated interrupt")]
    ForcedAbort,
}

impl TalkTableError {
    pub fn invocation(model: impl Into<String>, reason: impl ToString) -> Self {
        TalkTableError::ModelInvocation {
            model: model.into(),
            reason: reason.to_string(),
        }
    }

    pub fn lookup(model: impl Into<String>, reason: impl ToString) -> Self {
        TalkTableError::ModelLookup {
            model: model.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from the model gateway rather than from the
    /// transcript, configuration or the operator.
    pub fn is_gateway_failure(&self) -> bool {
        matches!(
            self,
            TalkTableError::ModelLookup { .. }
                | TalkTableError::ModelInvocation { .. }
                | TalkTableError::OpenAI(_)
        )
    }

    /// Process exit status for a session that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            TalkTableError::ForcedAbort => 130,
            _ => 1,
        }
    }
}

impl From<rusqlite::Error> for TalkTableError {
    fn from(e: rusqlite::Error) -> Self {
        TalkTableError::Persistence(e.to_string())
    }
}
