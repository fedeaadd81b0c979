//! Error types used by the statevisor engine and by background operations.
//!
//! This module defines three types:
//!
//! - [`EngineError`]: contract violations raised by the engine itself (a channel or
//!   the task registry used after shutdown).
//! - [`TaskError`]: the outcome of a background operation that did not succeed:
//!   either it was cancelled, or it failed.
//! - [`OperationFailure`]: the payload of a failed operation (cause, code, message).
//!
//! Cancellation is **not** a failure: [`TaskError::Canceled`] is never
//! handed to an `on_error` continuation and must be returned as-is by operations
//! that observe it.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// # Errors produced by the engine runtime.
///
/// These are programming-contract violations: the engine was asked to accept work
/// after it had been torn down. They are returned to the caller and logged.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The intent or effect channel was used after it was closed.
    #[error("{channel} channel is closed")]
    ChannelClosed {
        /// Which channel was closed (`"intent"` or `"effect"`).
        channel: &'static str,
    },

    /// The task registry was used after engine shutdown.
    #[error("task registry is terminated")]
    Terminated,
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use statevisor::EngineError;
    ///
    /// let err = EngineError::ChannelClosed { channel: "effect" };
    /// assert_eq!(err.as_label(), "channel_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::ChannelClosed { .. } => "channel_closed",
            EngineError::Terminated => "registry_terminated",
        }
    }
}

/// # Outcome of a background operation that did not succeed.
///
/// Operations scheduled through the engine return `Result<T, TaskError>`.
/// `Failed` is routed to the caller's `on_error` continuation; `Canceled` aborts
/// silently and must be propagated, never converted into a failure.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// The operation observed cancellation of its token.
    #[error("context cancelled")]
    Canceled,

    /// The operation failed.
    #[error(transparent)]
    Failed(#[from] OperationFailure),
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Canceled => "task_canceled",
            TaskError::Failed(_) => "task_failed",
        }
    }

    /// True if this is a cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }

    /// Shorthand for `TaskError::Failed(OperationFailure::new(message))`.
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(OperationFailure::new(message))
    }
}

type BoxedCause = Arc<dyn StdError + Send + Sync + 'static>;

/// # Failure of an operation running inside the engine.
///
/// Carries an optional underlying cause, an optional numeric code (for example an
/// HTTP status), and an optional human-readable message. Cheap to clone: the cause
/// is shared behind an `Arc`.
///
/// # Example
/// ```
/// use statevisor::OperationFailure;
///
/// let err = OperationFailure::new("user not found").with_code(404);
/// assert_eq!(err.code(), Some(404));
/// assert_eq!(err.to_string(), "operation failed (code 404): user not found");
/// ```
#[derive(Clone, Default)]
pub struct OperationFailure {
    message: Option<String>,
    code: Option<i32>,
    cause: Option<BoxedCause>,
}

impl OperationFailure {
    /// Creates a failure with a message and no cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            code: None,
            cause: None,
        }
    }

    /// Wraps an underlying error; its `Display` becomes the message.
    pub fn from_error<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: Some(err.to_string()),
            code: None,
            cause: Some(Arc::new(err)),
        }
    }

    /// Attaches a numeric code.
    #[must_use]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Replaces the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Human-readable message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Numeric code, if any.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Underlying cause, if any.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        "operation_failed"
    }
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation failed")?;
        if let Some(code) = self.code {
            write!(f, " (code {code})")?;
        }
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationFailure")
            .field("message", &self.message)
            .field("code", &self.code)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl StdError for OperationFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("socket closed")]
    struct SocketClosed;

    #[test]
    fn failure_display_includes_code_and_message() {
        let err = OperationFailure::new("boom").with_code(503);
        assert_eq!(err.to_string(), "operation failed (code 503): boom");

        let bare = OperationFailure::default();
        assert_eq!(bare.to_string(), "operation failed");
    }

    #[test]
    fn failure_keeps_cause_as_source() {
        let err = OperationFailure::from_error(SocketClosed);
        assert_eq!(err.message(), Some("socket closed"));
        let source = err.source().expect("cause should be exposed as source");
        assert_eq!(source.to_string(), "socket closed");
    }

    #[test]
    fn task_error_labels_are_stable() {
        assert_eq!(TaskError::Canceled.as_label(), "task_canceled");
        assert_eq!(TaskError::failed("x").as_label(), "task_failed");
        assert!(TaskError::Canceled.is_canceled());
        assert!(!TaskError::failed("x").is_canceled());
    }

    #[test]
    fn engine_error_labels_are_stable() {
        let closed = EngineError::ChannelClosed { channel: "intent" };
        assert_eq!(closed.as_label(), "channel_closed");
        assert_eq!(closed.to_string(), "intent channel is closed");
        assert_eq!(EngineError::Terminated.as_label(), "registry_terminated");
    }
}
