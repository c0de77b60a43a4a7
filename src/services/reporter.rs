//! Failure reporting sink.
//!
//! Reports are fire-and-forget and never influence control flow.

use std::error::Error;

pub trait FailureReporter: Send + Sync + 'static {
    /// Report `error` raised by `operation` while handling `context` (a key or path).
    fn report(&self, operation: &'static str, context: &str, error: &(dyn Error + 'static));
}

/// Emits each report as a structured `tracing` error event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report(&self, operation: &'static str, context: &str, error: &(dyn Error + 'static)) {
        tracing::error!(operation, context, error = %error, "operation failed");
    }
}
