//! Fan-out of the command × host cross-product onto a bounded worker pool
//!
//! Tasks are queued up front. A fixed number of workers pull from the queue,
//! run each task through the [`SessionExecutor`] and publish exactly one
//! [`TaskResult`] per task onto a shared unbounded channel.
//!
//! Completion is tracked by a single primitive: every worker holds a clone of
//! the result sender, so the channel closes exactly when the last worker has
//! exited, and a worker only exits after all of its results have been sent.
//! [`Dispatch::wait`] joins the workers before the receiver is dropped.
//!
//! # Example
//!
//! ```no_run
//! use fleetrun::dispatcher::TaskDispatcher;
//! use fleetrun::executors::ssh::SshExecutor;
//! use fleetrun::models::{Command, ConnectionConfig, Credential, Host};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Arc::new(ConnectionConfig::new(
//!     "ops",
//!     Credential::new("secret")?,
//!     Duration::from_secs(5),
//! ));
//! let dispatcher = TaskDispatcher::new(Arc::new(SshExecutor::new()), 16);
//!
//! let commands = vec![Command::new("uptime")?];
//! let hosts = vec![Host::new("web01")?, Host::new("web02")?];
//!
//! let summary = dispatcher
//!     .run(&commands, &hosts, config, &mut std::io::stdout())
//!     .await?;
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```

use crate::aggregator::{self, RunSummary};
use crate::error::SessionError;
use crate::executors::SessionExecutor;
use crate::models::{cross_product, Command, ConnectionConfig, Host, Task, TaskResult};
use crate::state::{TaskLifecycle, TaskState};
use futures::future::join_all;
use futures::FutureExt;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Default worker pool size
pub const DEFAULT_MAX_PARALLEL: usize = 16;

/// Upper bound on the worker pool size
pub const MAX_PARALLEL_LIMIT: usize = 256;

/// Launches a run's tasks onto a bounded pool of workers.
#[derive(Clone)]
pub struct TaskDispatcher {
    executor: Arc<dyn SessionExecutor>,
    max_parallel: usize,
}

/// Handle to an in-flight run.
///
/// Drain it with [`aggregator::collect`], then call [`Dispatch::wait`].
pub struct Dispatch {
    run_id: Uuid,
    expected: usize,
    results: mpsc::UnboundedReceiver<TaskResult>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskDispatcher {
    /// Create a dispatcher; a pool size of zero is raised to one.
    pub fn new(executor: Arc<dyn SessionExecutor>, max_parallel: usize) -> Self {
        Self {
            executor,
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Start every task of the cross-product without waiting for any.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(
        &self,
        commands: &[Command],
        hosts: &[Host],
        config: Arc<ConnectionConfig>,
    ) -> Dispatch {
        let run_id = Uuid::new_v4();
        let tasks = cross_product(commands, hosts);
        let expected = tasks.len();
        let worker_count = self.max_parallel.min(expected);

        let span = info_span!("dispatch", run_id = %run_id);
        span.in_scope(|| {
            info!(
                "Dispatching {} tasks ({} commands x {} hosts) on {} workers",
                expected,
                commands.len(),
                hosts.len(),
                worker_count
            );
        });

        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let (result_tx, results) = mpsc::unbounded_channel();

        let workers = (0..worker_count)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    queue: Arc::clone(&queue),
                    executor: Arc::clone(&self.executor),
                    config: Arc::clone(&config),
                    results: result_tx.clone(),
                };
                tokio::spawn(worker.run().instrument(span.clone()))
            })
            .collect();

        // Workers own the only remaining senders
        drop(result_tx);

        Dispatch {
            run_id,
            expected,
            results,
            workers,
        }
    }

    /// Dispatch, print every result to `out` as it arrives and wait for the
    /// workers to finish.
    pub async fn run<W: Write>(
        &self,
        commands: &[Command],
        hosts: &[Host],
        config: Arc<ConnectionConfig>,
        out: &mut W,
    ) -> io::Result<RunSummary> {
        let mut dispatch = self.dispatch(commands, hosts, config);
        let summary = aggregator::collect(&mut dispatch, out).await;
        dispatch.wait().await;
        summary
    }
}

impl Dispatch {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Number of results this run will produce
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Next result in arrival order, or `None` once every worker has exited.
    pub async fn next_result(&mut self) -> Option<TaskResult> {
        self.results.recv().await
    }

    /// Block until every worker has exited, then close the result channel.
    pub async fn wait(self) {
        let Dispatch {
            run_id,
            results,
            workers,
            ..
        } = self;

        for joined in join_all(workers).await {
            if let Err(e) = joined {
                error!(%run_id, "Worker terminated abnormally: {}", e);
            }
        }

        drop(results);
        debug!(%run_id, "All workers finished");
    }
}

struct Worker {
    id: usize,
    queue: Arc<Mutex<VecDeque<Task>>>,
    executor: Arc<dyn SessionExecutor>,
    config: Arc<ConnectionConfig>,
    results: mpsc::UnboundedSender<TaskResult>,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "Worker started");

        loop {
            let next = self.queue.lock().await.pop_front();
            let Some(task) = next else { break };
            self.run_task(task).await;
        }

        debug!(worker = self.id, "Worker finished");
    }

    async fn run_task(&self, task: Task) {
        let lifecycle = TaskLifecycle::new(task.id);
        debug!(
            worker = self.id,
            task_id = task.id,
            "Running '{}' on {}",
            task.command,
            task.host
        );

        let span = debug_span!("task", id = task.id, host = %task.host);
        let session = self
            .executor
            .execute(&task, &self.config, &lifecycle)
            .instrument(span);
        let outcome = AssertUnwindSafe(session)
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!(task_id = task.id, "Session executor panicked on {}", task.host);
                SessionError::execute("session executor panicked").into()
            });

        if self.results.send(TaskResult::new(&task, outcome)).is_err() {
            warn!(task_id = task.id, "Result receiver closed, result discarded");
        }

        for next in [TaskState::ResultPublished, TaskState::Completed] {
            if let Err(e) = lifecycle.advance(next) {
                warn!("{}", e);
            }
        }
    }
}
