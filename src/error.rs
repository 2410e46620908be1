//! Error types for fleetrun

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Setup and input errors.
///
/// None of these are raised by a running session: per-task failures are
/// carried in [`SessionError`] instead.
#[derive(Error, Debug)]
pub enum FleetError {
    /// An input list could not be opened or read
    #[error("could not open {path:?} - {source}")]
    InputSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings could not be loaded
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// Settings were loaded but are out of range
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// Empty command line
    #[error("Command cannot be empty")]
    EmptyCommand,

    /// Empty host line
    #[error("Host cannot be empty")]
    EmptyHost,

    /// Credential could not be read
    #[error("Credential error: {0}")]
    Credential(String),

    /// Lifecycle state machine violation
    #[error("Task {task_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        task_id: usize,
        from: crate::state::TaskState,
        to: crate::state::TaskState,
    },
}

/// Result type alias using FleetError
pub type Result<T> = std::result::Result<T, FleetError>;

/// Phase of a remote session in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// TCP connect, SSH handshake or authentication
    Connect,
    /// Opening the execution channel
    Channel,
    /// Running the command or reading its output
    Execute,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Connect => write!(f, "could not connect to host"),
            SessionPhase::Channel => write!(f, "could not establish session to host"),
            SessionPhase::Execute => write!(f, "could not execute command"),
        }
    }
}

/// Failure of a single remote session, folded into that task's result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{phase} - {cause}")]
pub struct SessionError {
    pub phase: SessionPhase,
    pub cause: String,
}

impl SessionError {
    pub fn new(phase: SessionPhase, cause: impl fmt::Display) -> Self {
        Self {
            phase,
            cause: cause.to_string(),
        }
    }

    pub fn connect(cause: impl fmt::Display) -> Self {
        Self::new(SessionPhase::Connect, cause)
    }

    pub fn channel(cause: impl fmt::Display) -> Self {
        Self::new(SessionPhase::Channel, cause)
    }

    pub fn execute(cause: impl fmt::Display) -> Self {
        Self::new(SessionPhase::Execute, cause)
    }
}
