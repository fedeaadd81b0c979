//! # Completion continuations for background operations.
//!
//! A [`Completion`] bundles the optional callbacks that run when an operation
//! started through `Scope::execute`, `Scope::with_retry` (and their keyed variants)
//! settles:
//!
//! ```text
//! Ok(v)             ──► on_success(v) ──► on_finally()
//! Err(Failed(f))    ──► on_error(f)   ──► on_finally()
//! Err(Canceled)     ──►                   on_finally()
//! future dropped    ──►                   on_finally()
//! ```
//!
//! `on_finally` is armed when the operation starts, so it runs exactly once for
//! every started operation, including one dropped mid-flight by cancellation or
//! replacement. An operation cancelled before it ever started runs nothing.
//!
//! A failure with no `on_error` installed is logged at `warn`; it never
//! propagates further.

use crate::error::{OperationFailure, TaskError};

type Callback<A> = Box<dyn FnOnce(A) + Send + 'static>;

/// Optional continuations for one operation.
pub struct Completion<T> {
    on_success: Option<Callback<T>>,
    on_error: Option<Callback<OperationFailure>>,
    on_finally: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            on_finally: None,
        }
    }
}

impl<T: Send + 'static> Completion<T> {
    /// Completion with no continuations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs with the value on success.
    pub fn on_success(mut self, f: impl FnOnce(T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Runs with the (last) failure.
    pub fn on_error(mut self, f: impl FnOnce(OperationFailure) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Runs last, once the started operation settles or is cancelled.
    pub fn on_finally(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_finally = Some(Box::new(f));
        self
    }

    /// Arms `on_finally`: from here on it runs when the returned guard resolves
    /// or is dropped.
    pub(crate) fn start(self) -> Started<T> {
        Started { inner: self }
    }

    /// Starts and immediately delivers `outcome`.
    #[cfg(test)]
    pub(crate) fn resolve(self, outcome: Result<T, TaskError>) -> bool {
        self.start().resolve(outcome)
    }
}

/// A [`Completion`] whose operation is running.
pub(crate) struct Started<T> {
    inner: Completion<T>,
}

impl<T> Started<T> {
    /// Delivers `outcome` to the matching continuation, then `on_finally`.
    ///
    /// Returns `false` if the outcome was a cancellation.
    pub(crate) fn resolve(mut self, outcome: Result<T, TaskError>) -> bool {
        match outcome {
            Ok(value) => {
                if let Some(f) = self.inner.on_success.take() {
                    f(value);
                }
                true
            }
            Err(TaskError::Failed(failure)) => {
                match self.inner.on_error.take() {
                    Some(f) => f(failure),
                    None => tracing::warn!(err = %failure, "unhandled operation failure"),
                }
                true
            }
            Err(TaskError::Canceled) => false,
        }
    }
}

impl<T> Drop for Started<T> {
    fn drop(&mut self) {
        if let Some(f) = self.inner.on_finally.take() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    fn recording(log: &Arc<Mutex<Vec<String>>>) -> Completion<u32> {
        let (s, e, f) = (Arc::clone(log), Arc::clone(log), Arc::clone(log));
        Completion::new()
            .on_success(move |v| s.lock().push(format!("ok {v}")))
            .on_error(move |err| e.lock().push(format!("err {err}")))
            .on_finally(move || f.lock().push("finally".into()))
    }

    #[test]
    fn success_runs_then_finally() {
        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(recording(&log).resolve(Ok(7)));
        assert_eq!(*log.lock(), vec!["ok 7", "finally"]);
    }

    #[test]
    fn failure_runs_error_then_finally() {
        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(recording(&log).resolve(Err(TaskError::failed("boom"))));
        assert_eq!(*log.lock(), vec!["err operation failed: boom", "finally"]);
    }

    #[test]
    fn cancellation_runs_only_finally() {
        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(!recording(&log).resolve(Err(TaskError::Canceled)));
        assert_eq!(*log.lock(), vec!["finally"]);
    }

    #[test]
    fn dropping_a_started_completion_runs_finally_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        drop(recording(&log).start());
        assert_eq!(*log.lock(), vec!["finally"]);
    }

    #[test]
    fn unstarted_completion_runs_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        drop(recording(&log));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn missing_continuations_are_fine() {
        assert!(Completion::<()>::new().resolve(Err(TaskError::failed("ignored"))));
        assert!(Completion::new().resolve(Ok(1_u8)));
    }
}
