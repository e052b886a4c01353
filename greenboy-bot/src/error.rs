//! Error types of the bot

use std::path::PathBuf;
use thiserror::Error;

/// A scheduler query that did not produce a usable answer
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The tool exited nonzero, timed out or could not be started
    #[error("{command} failed: {message}")]
    CommandFailed { command: String, message: String },

    /// The tool answered but the job is not in its output
    #[error("job {0} not found")]
    NotFound(String),

    /// Input that does not start with a numeric job id
    #[error("invalid job ID format: {0}")]
    InvalidJobId(String),
}

impl SchedulerError {
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Text to show in chat, without the command name
    pub fn user_message(&self) -> String {
        match self {
            Self::CommandFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Failure to read or write the monitored jobs file
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry file {path} is not valid: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to take one of the instance guard resources
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("lock file {path} is held by another process")]
    LockHeld { path: PathBuf },

    #[error("port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("lock file {path}: {source}")]
    LockIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("port {port}: {source}")]
    PortIo {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_command() {
        let err = SchedulerError::command_failed("scontrol", "Invalid job id specified");
        assert_eq!(err.user_message(), "Invalid job id specified");
        assert_eq!(err.to_string(), "scontrol failed: Invalid job id specified");
    }
}
