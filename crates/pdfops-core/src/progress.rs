//! Cooperative progress reporting and cancellation
//!
//! Transforms run sequentially and call [`TaskContext::step`] between
//! page-level units of work. That is the only place a cancel request is
//! observed, so cancellation takes effect at the next step, never mid-page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::PdfOpsError;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Receives `(percent, status)` updates from a running transform.
pub trait ProgressReporter {
    fn report(&mut self, percent: u8, status: &str);
}

impl<F> ProgressReporter for F
where
    F: FnMut(u8, &str),
{
    fn report(&mut self, percent: u8, status: &str) {
        self(percent, status)
    }
}

/// Cancellation token and progress callback handed to a transform.
pub struct TaskContext<'a> {
    cancel: Option<&'a CancellationToken>,
    reporter: Option<&'a mut dyn ProgressReporter>,
    last_percent: u8,
}

impl<'a> TaskContext<'a> {
    pub fn new(cancel: &'a CancellationToken, reporter: &'a mut dyn ProgressReporter) -> Self {
        Self {
            cancel: Some(cancel),
            reporter: Some(reporter),
            last_percent: 0,
        }
    }

    /// A context that never cancels and reports nowhere.
    pub fn detached() -> Self {
        Self {
            cancel: None,
            reporter: None,
            last_percent: 0,
        }
    }

    pub fn with_cancellation(cancel: &'a CancellationToken) -> Self {
        Self {
            cancel: Some(cancel),
            reporter: None,
            last_percent: 0,
        }
    }

    pub fn with_reporter(reporter: &'a mut dyn ProgressReporter) -> Self {
        Self {
            cancel: None,
            reporter: Some(reporter),
            last_percent: 0,
        }
    }

    /// Fail with [`PdfOpsError::Cancelled`] if cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), PdfOpsError> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(PdfOpsError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Suspension point: check for cancellation, then report `done` of
    /// `total` units.
    pub fn step(&mut self, done: usize, total: usize, status: &str) -> Result<(), PdfOpsError> {
        self.checkpoint()?;
        let percent = if total == 0 {
            100
        } else {
            ((done.min(total) * 100) / total) as u8
        };
        self.report(percent, status);
        Ok(())
    }

    /// Report progress without a cancellation check. Percent never moves
    /// backwards.
    pub fn report(&mut self, percent: u8, status: &str) {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;
        if let Some(reporter) = self.reporter.as_deref_mut() {
            reporter.report(percent, status);
        }
    }

    pub fn finish(&mut self, status: &str) {
        self.report(100, status);
    }
}

impl Default for TaskContext<'_> {
    fn default() -> Self {
        Self::detached()
    }
}
