//! # Runtime events emitted by the engine.
//!
//! The [`EventKind`] enum classifies what happened inside the engine:
//! - **Dispatch events**: intents reaching the handler and handler failures
//! - **Task events**: keyed/anonymous task lifecycle inside the registry
//! - **Policy events**: retry backoff, retry exhaustion, throttle drops
//! - **Channel events**: effect overflow, shutdown
//! - **Subscriber events**: overflow/panic of observability subscribers
//!
//! These are observability records, distinct from the intents a screen submits.
//! The [`Event`] struct carries a global sequence number, a timestamp, and optional
//! metadata depending on the kind.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use statevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_key("load-user")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(2))
//!     .with_reason("timeout");
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.key.as_deref(), Some("load-user"));
//! assert_eq!(ev.delay_ms, Some(2000));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Dispatch ===
    /// An intent was handed to the handler.
    ///
    /// Sets: `reason` (handler name).
    IntentDispatched,

    /// The handler returned an error for an intent.
    ///
    /// Sets: `reason` (failure message).
    HandlerFailed,

    /// The handler panicked while handling an intent.
    ///
    /// Sets: `reason` (panic payload).
    HandlerPanicked,

    // === Tasks ===
    /// A task was registered and spawned.
    ///
    /// Sets: `key` (if keyed), `task_id`.
    TaskStarted,

    /// A keyed task displaced a previous occupant of the same key.
    ///
    /// Sets: `key`, `task_id` (of the displaced task).
    TaskReplaced,

    /// A task was cancelled by key, in bulk, or at shutdown.
    ///
    /// Sets: `key` (if keyed), `task_id`.
    TaskCancelled,

    /// A task ran to completion (its operation returned).
    ///
    /// Sets: `key` (if keyed), `task_id`.
    TaskFinished,

    /// A task's operation panicked.
    ///
    /// Sets: `key` (if keyed), `task_id`, `reason` (panic payload).
    TaskPanicked,

    // === Policies ===
    /// A retry attempt failed and the next attempt is scheduled.
    ///
    /// Sets: `key` (if keyed), `attempt` (1-based, the failed one), `delay_ms`, `reason`.
    RetryScheduled,

    /// Every retry attempt failed; the error continuation fires next.
    ///
    /// Sets: `key` (if keyed), `attempt` (total attempts), `reason` (last failure).
    RetryExhausted,

    /// A throttled call arrived during cooldown and was dropped.
    ///
    /// Sets: `key` (throttle key).
    ThrottleDropped,

    // === Channels ===
    /// The effect channel was full and evicted its oldest buffered effect.
    ///
    /// Sets: `reason` (capacity).
    EffectDropped,

    /// Engine teardown started.
    ShutdownRequested,

    // === Subscribers ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `key` (subscriber name), `reason`.
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `key` (subscriber name), `reason` (panic info).
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task key, throttle/debounce key, or subscriber name.
    pub key: Option<Arc<str>>,
    /// Registry identity of the task, if applicable.
    pub task_id: Option<u64>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Backoff delay before next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            key: None,
            task_id: None,
            attempt: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a key.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches a key if one is present.
    #[inline]
    pub fn with_key_opt(mut self, key: Option<&str>) -> Self {
        self.key = key.map(Arc::from);
        self
    }

    /// Attaches a task identity.
    #[inline]
    pub fn with_task_id(mut self, id: u64) -> Self {
        self.task_id = Some(id);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_key(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_key(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_info(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::TaskStarted);
        let b = Event::new(EventKind::TaskFinished);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_is_clamped_to_u32_millis() {
        let ev = Event::new(EventKind::RetryScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn panic_info_reads_str_and_string_payloads() {
        let s: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_info(s.as_ref()), "static");
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_info(owned.as_ref()), "owned");
        let other: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_info(other.as_ref()), "unknown panic");
    }
}
