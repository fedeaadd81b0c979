//! # LogWriter: tracing-backed event logger
//!
//! A subscriber that renders every runtime [`Event`] through `tracing`, at a level
//! matching its severity. Install any `tracing` subscriber (for example
//! `tracing_subscriber::fmt`) to see the output.
//!
//! ## Levels
//! - `trace`: intent dispatch
//! - `debug`: task start/replace/cancel/finish, throttle drops
//! - `info`: retry scheduled, shutdown
//! - `warn`: handler failure, retry exhaustion, effect eviction, subscriber overflow
//! - `error`: handler/task/subscriber panics

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let key = e.key.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::IntentDispatched => {
                tracing::trace!(seq = e.seq, handler = reason, "intent dispatched");
            }
            EventKind::HandlerFailed => {
                tracing::warn!(seq = e.seq, err = reason, "handler failed");
            }
            EventKind::HandlerPanicked => {
                tracing::error!(seq = e.seq, info = reason, "handler panicked");
            }
            EventKind::TaskStarted => {
                tracing::debug!(seq = e.seq, key, task_id = e.task_id, "task started");
            }
            EventKind::TaskReplaced => {
                tracing::debug!(seq = e.seq, key, task_id = e.task_id, "task replaced");
            }
            EventKind::TaskCancelled => {
                tracing::debug!(seq = e.seq, key, task_id = e.task_id, "task cancelled");
            }
            EventKind::TaskFinished => {
                tracing::debug!(seq = e.seq, key, task_id = e.task_id, "task finished");
            }
            EventKind::TaskPanicked => {
                tracing::error!(seq = e.seq, key, task_id = e.task_id, info = reason, "task panicked");
            }
            EventKind::RetryScheduled => {
                tracing::info!(
                    seq = e.seq,
                    key,
                    attempt = e.attempt,
                    delay_ms = e.delay_ms,
                    err = reason,
                    "retry scheduled"
                );
            }
            EventKind::RetryExhausted => {
                tracing::warn!(seq = e.seq, key, attempts = e.attempt, err = reason, "retry exhausted");
            }
            EventKind::ThrottleDropped => {
                tracing::debug!(seq = e.seq, key, "throttled call dropped");
            }
            EventKind::EffectDropped => {
                tracing::warn!(seq = e.seq, detail = reason, "effect evicted on overflow");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(seq = e.seq, "shutdown requested");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(seq = e.seq, subscriber = key, detail = reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(seq = e.seq, subscriber = key, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
