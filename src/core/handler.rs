//! # Handler: the screen-specific logic plugged into an [`Engine`](crate::Engine).
//!
//! A handler declares three associated types and one synchronous entry point:
//!
//! - `State`: the immutable snapshot screens render (value semantics, compared with `PartialEq`)
//! - `Intent`: what screens submit
//! - `Effect`: one-shot outputs (navigation, toasts) consumed exactly once
//!
//! `handle` runs on the dispatch loop, one intent at a time. It should return
//! quickly: anything slow goes into a background task through the
//! [`Scope`] (`run_keyed`, `execute`, `with_retry`, `debounce`, ...).
//!
//! ## Example
//! ```rust
//! use statevisor::{Handler, OperationFailure, Scope};
//!
//! #[derive(Clone, PartialEq, Default)]
//! struct Counter { value: i64 }
//!
//! enum Intent { Add(i64), Clear }
//!
//! struct CounterHandler;
//!
//! impl Handler for CounterHandler {
//!     type State = Counter;
//!     type Intent = Intent;
//!     type Effect = String;
//!
//!     fn initial_state(&self) -> Counter { Counter::default() }
//!
//!     fn handle(&self, scope: &Scope<Counter, String>, intent: Intent) -> Result<(), OperationFailure> {
//!         match intent {
//!             Intent::Add(n) => { scope.set_state(|s| Counter { value: s.value + n }); }
//!             Intent::Clear => { scope.reset_state(); }
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use crate::{core::scope::Scope, error::OperationFailure};

/// Screen logic driven by an [`Engine`](crate::Engine).
pub trait Handler: Send + Sync + 'static {
    /// Snapshot type held by the state container.
    type State: Clone + PartialEq + Send + Sync + 'static;
    /// Submitted event type.
    type Intent: Send + 'static;
    /// One-shot output type.
    type Effect: Send + 'static;

    /// Value the state starts from and returns to on `reset_state`.
    fn initial_state(&self) -> Self::State;

    /// Handles one intent.
    ///
    /// An `Err` is logged and reported as `HandlerFailed`; it does not stop
    /// dispatching. So is a panic.
    fn handle(
        &self,
        scope: &Scope<Self::State, Self::Effect>,
        intent: Self::Intent,
    ) -> Result<(), OperationFailure>;

    /// Name used in logs and events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
