//! Per-task lifecycle tracking
//!
//! Every task moves through
//! `Pending -> Connecting -> Executing -> ResultPublished -> Completed`.
//! States only move forward. A session that fails while connecting jumps
//! straight to `ResultPublished`, but no task reaches `Completed` without
//! first publishing its result.

use crate::error::{FleetError, Result};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::trace;

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Connecting = 1,
    Executing = 2,
    ResultPublished = 3,
    Completed = 4,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Pending,
            1 => TaskState::Connecting,
            2 => TaskState::Executing,
            3 => TaskState::ResultPublished,
            _ => TaskState::Completed,
        }
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_advance_to(self, next: TaskState) -> bool {
        if next <= self {
            return false;
        }
        match next {
            TaskState::Executing => self == TaskState::Connecting,
            TaskState::Completed => self == TaskState::ResultPublished,
            _ => true,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == TaskState::Completed
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Connecting => write!(f, "connecting"),
            TaskState::Executing => write!(f, "executing"),
            TaskState::ResultPublished => write!(f, "result_published"),
            TaskState::Completed => write!(f, "completed"),
        }
    }
}

/// Lifecycle of one task, shared between the worker and the executor.
#[derive(Debug)]
pub struct TaskLifecycle {
    task_id: usize,
    state: AtomicU8,
}

impl TaskLifecycle {
    pub fn new(task_id: usize) -> Self {
        Self {
            task_id,
            state: AtomicU8::new(TaskState::Pending as u8),
        }
    }

    pub fn task_id(&self) -> usize {
        self.task_id
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next`, rejecting regressions, repeats and skipped publication.
    pub fn advance(&self, next: TaskState) -> Result<()> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let from = TaskState::from_u8(current);
            if !from.can_advance_to(next) {
                return Err(FleetError::InvalidTransition {
                    task_id: self.task_id,
                    from,
                    to: next,
                });
            }
            match self.state.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    trace!(task_id = self.task_id, %from, to = %next, "task state");
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }
}
