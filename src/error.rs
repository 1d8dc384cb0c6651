//! Error types for procsim

use thiserror::Error;

/// Errors that can occur while analysing or executing a procedure
#[derive(Error, Debug)]
pub enum ProcSimError {
    #[error("Invalid procedure text: {message}")]
    BadInput { message: String },

    #[error("Engine error {number}: {message}")]
    Engine { number: i32, message: String },

    #[error("Internal invariant violated: {message}")]
    Internal { message: String },

    #[error("Run cancelled")]
    Cancelled,
}

impl ProcSimError {
    pub fn bad_input(message: impl Into<String>) -> Self {
        ProcSimError::BadInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ProcSimError::Internal {
            message: message.into(),
        }
    }
}
