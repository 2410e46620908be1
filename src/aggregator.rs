//! Fan-in of task results onto the output stream

use crate::dispatcher::Dispatch;
use crate::models::TaskResult;
use std::fmt;
use std::io::{self, Write};
use tracing::{error, info};

/// Totals for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub expected: usize,
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            ..Self::default()
        }
    }

    fn record(&mut self, result: &TaskResult) {
        self.received += 1;
        if result.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Results that never arrived
    pub fn missing(&self) -> usize {
        self.expected.saturating_sub(self.received)
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} results ({} succeeded, {} failed)",
            self.received, self.expected, self.succeeded, self.failed
        )
    }
}

/// Write each result of `dispatch` to `out` as it arrives.
///
/// Stops after exactly [`Dispatch::expected`] results. If the channel closes
/// first, the shortfall is reported in [`RunSummary::missing`] instead of
/// blocking forever.
pub async fn collect<W: Write>(dispatch: &mut Dispatch, out: &mut W) -> io::Result<RunSummary> {
    let mut summary = RunSummary::new(dispatch.expected());

    while summary.received < summary.expected {
        let Some(result) = dispatch.next_result().await else {
            break;
        };

        writeln!(out, "{}", result)?;
        out.flush()?;
        summary.record(&result);
    }

    if summary.is_complete() {
        info!(run_id = %dispatch.run_id(), "Run finished: {}", summary);
    } else {
        error!(
            run_id = %dispatch.run_id(),
            "Run ended with {} results missing: {}",
            summary.missing(),
            summary
        );
    }

    Ok(summary)
}
