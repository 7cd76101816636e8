// Central Error Type for the Application

use crate::port::{PoolError, StoreError};
use thiserror::Error;
use tracing::error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Escalated failure: short message for the caller, full detail for operators
    #[error("{message}")]
    Unexpected { message: String, details: String },
}

impl AppError {
    pub fn unexpected(message: impl Into<String>, details: impl Into<String>) -> Self {
        AppError::Unexpected {
            message: message.into(),
            details: details.into(),
        }
    }

    /// Diagnostic detail attached to the error, if any
    pub fn details(&self) -> Option<String> {
        match self {
            AppError::Unexpected { details, .. } => Some(details.clone()),
            AppError::Store(err) => Some(err.details()),
            _ => None,
        }
    }
}

impl From<PoolError> for AppError {
    fn from(err: PoolError) -> Self {
        AppError::Store(StoreError::Pool(err))
    }
}

impl StoreError {
    /// Escalate to [`AppError::Unexpected`], writing the detail to the log sink
    pub fn escalate(self, message: impl Into<String>) -> AppError {
        let message = message.into();
        let details = self.details();
        error!(
            classification = self.classification(),
            details = %details,
            "{}",
            message
        );
        AppError::Unexpected { message, details }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
