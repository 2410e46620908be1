//! SSH session executor
//!
//! Each task gets its own session: connect, authenticate with the shared
//! password credential, open one exec channel, run the command and capture
//! its standard output. Standard error is discarded.
//!
//! Failures are never raised. They are reported as a [`SessionError`]
//! tagged with the phase that failed:
//! - `Connect` covers TCP connect, SSH handshake and authentication
//! - `Channel` covers opening the exec channel
//! - `Execute` covers running the command and reading its output
//!
//! Once a channel is open it is always closed before the session ends,
//! whether the command succeeded or not.
//!
//! # Example
//!
//! ```no_run
//! use fleetrun::executors::ssh::SshExecutor;
//! use fleetrun::executors::SessionExecutor;
//! use fleetrun::models::{cross_product, Command, ConnectionConfig, Credential, Host};
//! use fleetrun::state::TaskLifecycle;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Arc::new(ConnectionConfig::new(
//!     "deploy",
//!     Credential::new("secret")?,
//!     Duration::from_secs(5),
//! ));
//! let tasks = cross_product(&[Command::new("uptime")?], &[Host::new("example.com")?]);
//!
//! let outcome = SshExecutor::new()
//!     .execute(&tasks[0], &config, &TaskLifecycle::new(tasks[0].id))
//!     .await;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

use crate::error::SessionError;
use crate::executors::{decode_output, SessionExecutor};
use crate::models::{Command, ConnectionConfig, Host, Task, TaskOutcome};
use crate::state::{TaskLifecycle, TaskState};
use async_trait::async_trait;
use ssh2::{Channel, ExtendedData, Session};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// SSH executor for remote command execution
///
/// Creates a new connection for every task; nothing is pooled or reused.
#[derive(Debug, Clone, Default)]
pub struct SshExecutor;

/// Captured result of a command run on an open channel
struct CommandOutput {
    stdout: String,
    exit_code: Option<i32>,
}

impl SshExecutor {
    /// Create a new SSH executor
    pub fn new() -> Self {
        Self
    }

    /// Open a TCP connection to the first reachable resolved address.
    fn connect_tcp(address: &str, timeout: Duration) -> Result<TcpStream, SessionError> {
        let addrs = address
            .to_socket_addrs()
            .map_err(|e| SessionError::connect(format!("could not resolve {}: {}", address, e)))?;

        let mut last_err = None;
        for addr in addrs {
            debug!("Connecting to {}", addr);
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(tcp) => return Ok(tcp),
                Err(e) => last_err = Some(e),
            }
        }

        Err(match last_err {
            Some(e) => SessionError::connect(format!("dial tcp {}: {}", address, e)),
            None => SessionError::connect(format!("no addresses found for {}", address)),
        })
    }

    /// Create an authenticated SSH session
    ///
    /// TCP connect, handshake and authentication are each bounded by the
    /// connect timeout. The session timeout is lifted afterwards because
    /// command execution has no deadline.
    fn create_session(host: &Host, config: &ConnectionConfig) -> Result<Session, SessionError> {
        let target = host.address(config.port);
        debug!("Creating SSH session to {}", target);

        let tcp = Self::connect_tcp(&target, config.connect_timeout)?;

        let mut session = Session::new()
            .map_err(|e| SessionError::connect(format!("failed to create SSH session: {}", e)))?;

        let timeout_ms = u32::try_from(config.connect_timeout.as_millis()).unwrap_or(u32::MAX);
        session.set_timeout(timeout_ms);
        session.set_tcp_stream(tcp);

        session
            .handshake()
            .map_err(|e| SessionError::connect(format!("SSH handshake failed: {}", e)))?;

        session
            .userauth_password(&config.user, config.credential.expose())
            .map_err(|e| SessionError::connect(format!("authentication failed: {}", e)))?;

        if !session.authenticated() {
            return Err(SessionError::connect(format!(
                "authentication failed for user {}",
                config.user
            )));
        }

        session.set_timeout(0);

        info!("SSH session established to {}", target);

        Ok(session)
    }

    /// Run `command` on a fresh channel of `session`, closing the channel on
    /// every path once it exists.
    fn run_command(
        session: Session,
        host: &Host,
        command: &Command,
    ) -> Result<CommandOutput, SessionError> {
        let mut channel = session
            .channel_session()
            .map_err(|e| SessionError::channel(format!("failed to open channel: {}", e)))?;

        let stdout = Self::exec_on_channel(&mut channel, command);
        let closed = Self::release_channel(&mut channel, host);

        let exit_code = settled_exit_code(closed, channel.exit_status().ok());

        if let Err(e) = session.disconnect(None, "session finished", None) {
            debug!("Disconnect from {} failed: {}", host, e);
        }

        stdout.map(|stdout| CommandOutput { stdout, exit_code })
    }

    /// Run `command` and read its stdout to EOF.
    fn exec_on_channel(channel: &mut Channel, command: &Command) -> Result<String, SessionError> {
        // Unread stderr would otherwise fill the channel window
        channel
            .handle_extended_data(ExtendedData::Ignore)
            .map_err(|e| SessionError::channel(format!("failed to configure channel: {}", e)))?;

        debug!("Executing command: {}", command);

        channel
            .exec(command.as_str())
            .map_err(|e| SessionError::execute(format!("failed to execute command: {}", e)))?;

        let mut raw = Vec::new();
        channel
            .read_to_end(&mut raw)
            .map_err(|e| SessionError::execute(format!("failed to read stdout: {}", e)))?;

        debug!("Read {} bytes of stdout", raw.len());
        Ok(decode_output(raw))
    }

    /// Close the channel and wait for the remote close.
    ///
    /// Returns false if either step failed.
    fn release_channel(channel: &mut Channel, host: &Host) -> bool {
        if let Err(e) = channel.close() {
            warn!("Failed to close channel to {}: {}", host, e);
            return false;
        }
        if let Err(e) = channel.wait_close() {
            warn!("Failed waiting for channel close on {}: {}", host, e);
            return false;
        }
        true
    }
}

/// The exit status is only final once the remote side has closed the
/// channel; before that libssh2 reports a default of 0.
fn settled_exit_code(closed: bool, reported: Option<i32>) -> Option<i32> {
    if closed {
        reported
    } else {
        None
    }
}

#[async_trait]
impl SessionExecutor for SshExecutor {
    async fn execute(
        &self,
        task: &Task,
        config: &Arc<ConnectionConfig>,
        lifecycle: &TaskLifecycle,
    ) -> TaskOutcome {
        if let Err(e) = lifecycle.advance(TaskState::Connecting) {
            warn!("{}", e);
        }

        info!(
            "Executing SSH command on {}@{}: {}",
            config.user, task.host, task.command
        );
        let start = Instant::now();

        // ssh2 is synchronous; keep it off the async workers
        let host = task.host.clone();
        let session_config = Arc::clone(config);
        let session = match tokio::task::spawn_blocking(move || {
            Self::create_session(&host, &session_config)
        })
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!("Connecting to {} failed: {}", task.host, e.cause);
                return e.into();
            }
            Err(e) => return SessionError::connect(format!("task join error: {}", e)).into(),
        };

        if let Err(e) = lifecycle.advance(TaskState::Executing) {
            warn!("{}", e);
        }

        let host = task.host.clone();
        let command = task.command.clone();
        let result =
            tokio::task::spawn_blocking(move || Self::run_command(session, &host, &command)).await;

        let outcome = match result {
            Ok(Ok(output)) => TaskOutcome::Success {
                stdout: output.stdout,
                exit_code: output.exit_code,
            },
            Ok(Err(e)) => {
                warn!("Command on {} failed: {}", task.host, e);
                e.into()
            }
            Err(e) => SessionError::execute(format!("task join error: {}", e)).into(),
        };

        info!(
            "SSH command on {} completed in {:?} (success: {})",
            task.host,
            start.elapsed(),
            outcome.is_success()
        );

        outcome
    }
}
