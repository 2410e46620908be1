//! Core data models for fleetrun

use crate::error::{FleetError, Result, SessionError};
use std::fmt;
use std::time::Duration;
use zeroize::Zeroizing;

/// Conventional remote-shell port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// A line of text run verbatim on the remote shell.
///
/// Only blank lines are rejected; length and content are the remote
/// shell's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(FleetError::EmptyCommand);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A remote endpoint: hostname or IP, optionally carrying its own port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host(String);

impl Host {
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(FleetError::EmptyHost);
        }
        Ok(Self(addr.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Socket address string for this host, with `default_port` appended
    /// unless the host already names a port.
    ///
    /// Bare IPv6 literals are bracketed before the port is added.
    pub fn address(&self, default_port: u16) -> String {
        let host = self.0.as_str();

        if let Some(rest) = host.strip_prefix('[') {
            return match rest.split_once(']') {
                Some((_, port)) if port.starts_with(':') => host.to_string(),
                _ => format!("{}:{}", host, default_port),
            };
        }

        match host.matches(':').count() {
            0 => format!("{}:{}", host, default_port),
            1 => host.to_string(),
            _ => format!("[{}]:{}", host, default_port),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared secret used for password authentication.
///
/// Wiped from memory on drop; never printed.
#[derive(Clone)]
pub struct Credential(Zeroizing<String>);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = Zeroizing::new(secret.into());
        if secret.is_empty() {
            return Err(FleetError::Credential(
                "credential cannot be empty".to_string(),
            ));
        }
        Ok(Self(secret))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Connection settings shared read-only by every session in a run.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub user: String,
    pub credential: Credential,
    /// Bounds TCP connect and SSH negotiation; command execution is unbounded
    pub connect_timeout: Duration,
    /// Port used for hosts that do not specify one
    pub port: u16,
}

impl ConnectionConfig {
    pub fn new(user: impl Into<String>, credential: Credential, connect_timeout: Duration) -> Self {
        Self {
            user: user.into(),
            credential,
            connect_timeout,
            port: DEFAULT_SSH_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// One (command, host) pair from the cross-product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Position in host-major dispatch order
    pub id: usize,
    pub command: Command,
    pub host: Host,
}

/// Build the full cross-product of hosts and commands.
///
/// Host-major: every command for the first host, then the next host.
pub fn cross_product(commands: &[Command], hosts: &[Host]) -> Vec<Task> {
    hosts
        .iter()
        .flat_map(|host| commands.iter().map(move |command| (host, command)))
        .enumerate()
        .map(|(id, (host, command))| Task {
            id,
            command: command.clone(),
            host: host.clone(),
        })
        .collect()
}

/// Outcome of one remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success {
        stdout: String,
        /// Remote exit status, when the server reported one
        exit_code: Option<i32>,
    },
    Failure(SessionError),
}

impl TaskOutcome {
    pub fn success(stdout: impl Into<String>) -> Self {
        TaskOutcome::Success {
            stdout: stdout.into(),
            exit_code: Some(0),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }
}

impl From<SessionError> for TaskOutcome {
    fn from(err: SessionError) -> Self {
        TaskOutcome::Failure(err)
    }
}

/// Result of exactly one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub task_id: usize,
    pub host: Host,
    pub command: Command,
    pub outcome: TaskOutcome,
}

impl TaskResult {
    pub fn new(task: &Task, outcome: TaskOutcome) -> Self {
        Self {
            task_id: task.id,
            host: task.host.clone(),
            command: task.command.clone(),
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Output line: `<host>: <stdout>` or `<host>: Error: <phase> - <cause>`.
///
/// One trailing line ending of the captured stdout is dropped so that the
/// caller's line terminator ends the record.
impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            TaskOutcome::Success { stdout, .. } => {
                let text = stdout
                    .strip_suffix("\r\n")
                    .or_else(|| stdout.strip_suffix('\n'))
                    .unwrap_or(stdout.as_str());
                write!(f, "{}: {}", self.host, text)
            }
            TaskOutcome::Failure(err) => write!(f, "{}: Error: {}", self.host, err),
        }
    }
}
