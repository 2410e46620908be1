//! Session executors

pub mod ssh;

#[cfg(test)]
pub(crate) mod test_server;

use crate::models::{ConnectionConfig, Task, TaskOutcome};
use crate::state::TaskLifecycle;
use async_trait::async_trait;
use std::sync::Arc;

/// Runs one task against its host.
///
/// Implementations never fail the call itself: every problem is reported
/// through [`TaskOutcome::Failure`] so one host cannot disturb the others.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionExecutor: Send + Sync {
    /// Execute `task` using the shared connection settings.
    ///
    /// `config` is the run's single shared value; clone the `Arc` to move
    /// it into blocking work.
    ///
    /// Implementations may advance `lifecycle` through `Connecting` and
    /// `Executing`; publication and completion belong to the dispatcher.
    async fn execute(
        &self,
        task: &Task,
        config: &Arc<ConnectionConfig>,
        lifecycle: &TaskLifecycle,
    ) -> TaskOutcome;
}

/// Decode captured stdout, replacing invalid UTF-8 with U+FFFD.
///
/// Valid output is moved into the `String` without copying.
pub(crate) fn decode_output(raw: Vec<u8>) -> String {
    match String::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
