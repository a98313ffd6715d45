//! Error taxonomy
//!
//! Every user-facing failure maps onto one of these variants. Only
//! [`BotError::Config`] is fatal, and only at startup.

use std::path::PathBuf;
use thiserror::Error;

/// Bot errors
#[derive(Error, Debug)]
pub enum BotError {
    /// Missing or invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// A structured file could not be parsed
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Endpoint descriptor lacks required fields
    #[error("Endpoint config is missing required fields: {}", missing.join(", "))]
    Validation { missing: Vec<String> },

    #[error("User '{0}' already exists")]
    DuplicateUser(String),

    #[error("User '{0}' not found")]
    UserNotFound(String),

    /// Username would not fit into a list button
    #[error("Username '{username}' is longer than {max} bytes")]
    UsernameTooLong { username: String, max: usize },

    /// External tool exited non-zero, timed out or could not be spawned
    #[error("{message}: {stderr}")]
    Command { message: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Chat transport failed to deliver a message
    #[error("Transport error: {0}")]
    Transport(String),
}

impl BotError {
    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for bot operations
pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_lists_every_field() {
        let err = BotError::Validation {
            missing: vec!["password".into(), "username".into()],
        };
        assert_eq!(
            err.to_string(),
            "Endpoint config is missing required fields: password, username"
        );
    }

    #[test]
    fn test_command_error_carries_stderr() {
        let err = BotError::Command {
            message: "Command failed with exit code 2".into(),
            stderr: "no such host".into(),
        };
        assert_eq!(err.to_string(), "Command failed with exit code 2: no such host");
    }
}
