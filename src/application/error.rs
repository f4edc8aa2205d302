use std::error::Error as StdError;

use thiserror::Error;

use crate::{application::undo::UndoError, infra::error::InfraError};

/// Error text of `error` followed by each of its sources, outermost first.
pub fn error_chain(error: &dyn StdError) -> Vec<String> {
    let mut messages = vec![error.to_string()];
    let mut current = error.source();
    while let Some(inner) = current {
        messages.push(inner.to_string());
        current = inner.source();
    }
    messages
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Undo(#[from] UndoError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status for the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Undo(UndoError::NotFound(_)) => 2,
            AppError::Undo(UndoError::Conflict { .. }) => 3,
            AppError::Undo(UndoError::Validation { .. })
            | AppError::Undo(UndoError::UnsupportedEntityType { .. }) => 64,
            _ => 1,
        }
    }
}
