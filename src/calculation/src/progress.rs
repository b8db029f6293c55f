//! Progress reporting and cooperative cancellation.
//!
//! Solvers write human-readable status lines and an iteration counter to a
//! [`ProgressSink`], and poll a [`CancelToken`] at every outer-loop boundary
//! (per operating point, per Newton step, per wake relaxation pass).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{AnalysisError, AnalysisResult};

/// Write-only channel for solver status. Implementations must not fail.
pub trait ProgressSink {
    /// One status line, e.g. "Solving the linear system...".
    fn message(&mut self, line: &str);

    /// Current iteration counter of the running loop.
    fn iteration(&mut self, _iteration: usize) {}
}

/// Forwards status lines to the `log` facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn message(&mut self, line: &str) {
        log::info!("{}", line);
    }

    fn iteration(&mut self, iteration: usize) {
        log::trace!("iteration {}", iteration);
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn message(&mut self, _line: &str) {}
}

/// Keeps every line in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectSink {
    pub lines: Vec<String>,
    pub last_iteration: usize,
}

impl ProgressSink for CollectSink {
    fn message(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn iteration(&mut self, iteration: usize) {
        self.last_iteration = iteration;
    }
}

/// Shared poll-only cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    /// Set once cancellation is requested
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag before reusing the token for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Run context threaded through every solver call.
pub struct RunContext<'a> {
    /// Destination of status lines and iteration counts
    sink: &'a mut dyn ProgressSink,
    /// Cancellation flag polled by the solvers
    cancel: CancelToken,
}

impl<'a> RunContext<'a> {
    /// Context reporting to `sink` and polling `cancel`.
    pub fn new(sink: &'a mut dyn ProgressSink, cancel: CancelToken) -> Self {
        Self { sink, cancel }
    }

    /// Emit a status line.
    pub fn log(&mut self, line: impl AsRef<str>) {
        self.sink.message(line.as_ref());
    }

    /// Report the current iteration.
    pub fn iteration(&mut self, iteration: usize) {
        self.sink.iteration(iteration);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check_cancel(&self) -> AnalysisResult<()> {
        if self.cancel.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// The cancellation token, for handing to nested runs.
    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!other.is_cancelled());
    }

    #[test]
    fn test_context_check_cancel() {
        let mut sink = CollectSink::default();
        let token = CancelToken::new();
        let mut ctx = RunContext::new(&mut sink, token.clone());
        ctx.log("Creating the influence matrix...");
        ctx.iteration(3);
        assert!(ctx.check_cancel().is_ok());
        token.cancel();
        assert_eq!(ctx.check_cancel(), Err(AnalysisError::Cancelled));
        drop(ctx);
        assert_eq!(sink.lines, vec!["Creating the influence matrix...".to_string()]);
        assert_eq!(sink.last_iteration, 3);
    }
}
