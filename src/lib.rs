//! # statevisor
//!
//! **Statevisor** is a unidirectional state-coordination engine for interactive
//! screens, built on Tokio.
//!
//! A screen submits **intents**; a [`Handler`] turns them into **state** updates
//! and one-shot **effects**, starting cancellable background work along the way.
//! The engine guarantees ordered intent handling, atomic state transitions,
//! at most one live task per key, and bounded effect delivery.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   screen ──submit(intent)──┐            ┌──observe_state / states──► screen
//!                            ▼            │
//! ┌───────────────────────────────────────┴───────────────────────────┐
//! │  Engine (composition root)                                        │
//! │  - IntentBus      (ordered queue + single dispatch loop)          │
//! │  - StateContainer (one committed value, atomic reducers)          │
//! │  - TaskRegistry   (keyed cancel-and-replace, anonymous tasks)     │
//! │  - EffectChannel  (bounded, drop-oldest, exactly-one consumer)    │
//! │  - Bus            (runtime events → SubscriberSet)                │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   handler.handle(&scope, intent)    background tasks (run_keyed / execute /
//!                                     with_retry / debounce / throttle / collect)
//!                                              │
//!                                              └──set_state / send_effect──► back into the engine
//! ```
//!
//! ### Keyed task lifecycle
//! ```text
//! run_keyed(k, op)
//!   ├─► lock registry
//!   │     ├─ occupant under k? → cancel its token, publish TaskReplaced
//!   │     └─ register new slot, publish TaskStarted
//!   ├─► spawn: await displaced task's unwind, then run op (cancellable)
//!   └─► on exit: deregister k only if the slot is still ours
//!         ├─ op returned   → TaskFinished
//!         ├─ cancelled     → TaskCancelled (future dropped, only on_finally runs)
//!         └─ panicked      → TaskPanicked
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                         |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Engine**        | Intents in, state and effects out.                           | [`Engine`], [`EngineBuilder`], [`Handler`] |
//! | **Handler API**   | State, effects, tasks, retry, rate limiting.                 | [`Scope`], [`Completion`]                  |
//! | **Building blocks** | Usable on their own.                                       | [`StateContainer`], [`EffectChannel`], [`TaskRegistry`] |
//! | **Policies**      | Bounded retry with linear backoff.                           | [`RetryPolicy`]                            |
//! | **Subscriber API**| Hook into runtime events (logging, metrics).                 | [`Subscribe`], [`Event`], [`EventKind`]    |
//! | **Errors**        | Typed errors for the engine and background operations.       | [`EngineError`], [`TaskError`], [`OperationFailure`] |
//! | **Configuration** | Capacities and policy defaults.                              | [`EngineConfig`]                           |
//!
//! ## Optional features
//! - `logging`: exports the built-in `LogWriter` subscriber, which renders events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use futures::StreamExt;
//! use statevisor::{Completion, Engine, Handler, OperationFailure, Scope, TaskError};
//!
//! #[derive(Clone, PartialEq, Default, Debug)]
//! struct Profile { name: Option<String>, loading: bool }
//!
//! enum Intent { Load(u32) }
//!
//! struct ProfileScreen;
//!
//! impl Handler for ProfileScreen {
//!     type State = Profile;
//!     type Intent = Intent;
//!     type Effect = String;
//!
//!     fn initial_state(&self) -> Profile { Profile::default() }
//!
//!     fn handle(&self, scope: &Scope<Profile, String>, intent: Intent) -> Result<(), OperationFailure> {
//!         let Intent::Load(id) = intent;
//!         scope.set_state(|s| Profile { loading: true, ..s.clone() });
//!
//!         let (ok, err) = (scope.clone(), scope.clone());
//!         scope
//!             .execute_keyed(
//!                 "load",
//!                 move |_ctx| async move {
//!                     tokio::time::sleep(Duration::from_millis(10)).await;
//!                     Ok::<_, TaskError>(format!("user #{id}"))
//!                 },
//!                 Completion::<String>::new()
//!                     .on_success(move |name| {
//!                         ok.set_state(|_| Profile { name: Some(name), loading: false });
//!                     })
//!                     .on_error(move |f| {
//!                         let _ = err.send_effect(f.to_string());
//!                     }),
//!             )
//!             .map_err(OperationFailure::from_error)?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(ProfileScreen);
//!     engine.submit(Intent::Load(7))?;
//!
//!     let mut names = engine.observe_state(|s: &Profile| s.name.clone());
//!     while let Some(name) = names.next().await {
//!         if let Some(name) = name {
//!             assert_eq!(name, "user #7");
//!             break;
//!         }
//!     }
//!
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod policies;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{
    Completion, EffectChannel, EffectReceiver, Engine, EngineBuilder, EngineConfig, Handler, Scope,
    StateContainer, StateStream, TaskId, TaskRegistry,
};
pub use error::{EngineError, OperationFailure, TaskError};
pub use events::{Bus, Event, EventKind};
pub use policies::RetryPolicy;
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
