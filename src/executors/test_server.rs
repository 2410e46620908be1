//! In-process SSH server for exercising the ssh2 executor end to end
//!
//! Every exec request is answered from a fixed [`Behavior`]. The server
//! records the commands it was asked to run and counts the channels that
//! clients opened and closed.

use crate::models::Host;
use russh::keys::{Algorithm, PrivateKey};
use russh::server::{Auth, Handle, Msg, Server as _, Session};
use russh::{Channel, ChannelId, CryptoVec};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// The only password the server accepts
pub(crate) const PASSWORD: &str = "fleet-test-password";

/// How the server answers a session.
#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    /// Accept the exec and write a canned reply
    Reply {
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        exit_status: u32,
    },
    /// Refuse to open a session channel
    RejectChannel,
    /// Open the channel but deny the exec request
    RejectExec,
}

impl Behavior {
    pub(crate) fn reply(stdout: impl Into<Vec<u8>>) -> Self {
        Behavior::Reply {
            stdout: stdout.into(),
            stderr: Vec::new(),
            exit_status: 0,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ServerStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    commands: Mutex<Vec<String>>,
}

impl ServerStats {
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Wait until clients have closed at least `expected` channels.
    ///
    /// The client may return before the server has processed its close.
    pub(crate) async fn wait_for_closed(&self, expected: usize) -> bool {
        for _ in 0..100 {
            if self.closed() >= expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }
}

pub(crate) struct TestServer {
    addr: SocketAddr,
    stats: Arc<ServerStats>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Listen on an ephemeral localhost port with a fresh host key.
    pub(crate) async fn start(behavior: Behavior) -> Self {
        let key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519).unwrap();
        let config = Arc::new(russh::server::Config {
            keys: vec![key],
            auth_rejection_time: Duration::ZERO,
            auth_rejection_time_initial: Some(Duration::ZERO),
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(ServerStats::default());

        let mut runner = SessionRunner {
            behavior,
            stats: Arc::clone(&stats),
        };
        let task = tokio::spawn(async move {
            if let Err(e) = runner.run_on_socket(config, &listener).await {
                tracing::error!("Test SSH server stopped: {}", e);
            }
        });

        Self { addr, stats, task }
    }

    pub(crate) fn host(&self) -> Host {
        Host::new(self.addr.to_string()).unwrap()
    }

    pub(crate) fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone)]
struct SessionRunner {
    behavior: Behavior,
    stats: Arc<ServerStats>,
}

impl russh::server::Server for SessionRunner {
    type Handler = Self;

    fn new_client(&mut self, _peer_addr: Option<SocketAddr>) -> Self::Handler {
        self.clone()
    }
}

impl russh::server::Handler for SessionRunner {
    type Error = anyhow::Error;

    fn auth_password(
        &mut self,
        _user: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<Auth, Self::Error>> + Send {
        let accepted = password == PASSWORD;
        async move {
            if accepted {
                Ok(Auth::Accept)
            } else {
                Ok(Auth::Reject {
                    proceed_with_methods: None,
                    partial_success: false,
                })
            }
        }
    }

    fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> impl std::future::Future<Output = Result<bool, Self::Error>> + Send {
        let accept = !matches!(self.behavior, Behavior::RejectChannel);
        if accept {
            self.stats.opened.fetch_add(1, Ordering::SeqCst);
        }
        async move { Ok(accept) }
    }

    fn exec_request(
        &mut self,
        channel_id: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send {
        self.stats
            .commands
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(data).into_owned());

        match &self.behavior {
            Behavior::Reply {
                stdout,
                stderr,
                exit_status,
            } => {
                let _ = session.channel_success(channel_id);
                // Handle messages are only processed once this handler returns
                let handle = session.handle();
                let (stdout, stderr, exit_status) = (stdout.clone(), stderr.clone(), *exit_status);
                tokio::spawn(async move {
                    send_reply(handle, channel_id, stdout, stderr, exit_status).await;
                });
            }
            Behavior::RejectChannel | Behavior::RejectExec => {
                let _ = session.channel_failure(channel_id);
                let _ = session.eof(channel_id);
                let _ = session.close(channel_id);
            }
        }

        async { Ok(()) }
    }

    fn channel_close(
        &mut self,
        _channel_id: ChannelId,
        _session: &mut Session,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    }
}

async fn send_reply(
    handle: Handle,
    channel_id: ChannelId,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_status: u32,
) {
    if !stderr.is_empty() {
        // Extended data type 1 = stderr
        let _ = handle
            .extended_data(channel_id, 1, CryptoVec::from_slice(&stderr))
            .await;
    }
    for chunk in stdout.chunks(32 * 1024) {
        if handle
            .data(channel_id, CryptoVec::from_slice(chunk))
            .await
            .is_err()
        {
            break;
        }
    }
    let _ = handle.exit_status_request(channel_id, exit_status).await;
    let _ = handle.eof(channel_id).await;
    let _ = handle.close(channel_id).await;
}
