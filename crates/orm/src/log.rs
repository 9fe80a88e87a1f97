use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Diagnostic callback invoked with a human readable message on every metadata resolution and
/// dialect selection.
///
/// Messages are always recorded as `tracing` debug events as well. A panicking callback is
/// contained and never reaches the caller.
#[derive(Clone, Default)]
pub struct LogSink {
    callback: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl LogSink {
    /// Sink forwarding to `callback`.
    #[must_use]
    pub fn new(callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// Emit `message`. Fire and forget.
    pub fn emit(&self, message: &str) {
        tracing::debug!(target: "tablemap", "{message}");

        if let Some(callback) = &self.callback {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(message)));
            if outcome.is_err() {
                tracing::warn!(target: "tablemap", "log sink panicked");
            }
        }
    }
}

impl Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").field("callback", &self.callback.is_some()).finish()
    }
}
