//! # Engine: composition root for one screen.
//!
//! Owns the state container, the effect channel, the task registry, the intent
//! queue and its dispatch loop, and wires them to a [`Handler`].
//!
//! ## Architecture
//! ```text
//! screen ── submit(intent) ──► IntentBus ──► dispatch loop ──► handler.handle(&scope, intent)
//!                                                                  │
//!                     ┌────────────────────────────────────────────┼──────────────────┐
//!                     ▼                                            ▼                  ▼
//!              StateContainer                               TaskRegistry        EffectChannel
//!          (set_state / reset_state)              (run_keyed / execute / retry /  (send_effect)
//!                     │                               debounce / throttle)              │
//!                     ▼                                                                 ▼
//! screen ◄── observe_state(mapper) / states()                          effects() ──► screen
//!
//! every part ── publish(Event) ──► Bus ──► subscriber listener ──► SubscriberSet
//! ```
//!
//! ## Shutdown path
//! ```text
//! shutdown()  (idempotent; Drop calls it too)
//!   ├─► Bus.publish(ShutdownRequested)
//!   ├─► runtime_token.cancel()  → dispatch loop exits, submissions refused
//!   ├─► TaskRegistry::shutdown  → every task cancelled, later runs refused
//!   └─► EffectChannel::close    → consumers drain, then end
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        builder::EngineBuilder,
        config::EngineConfig,
        effects::{EffectChannel, EffectReceiver},
        handler::Handler,
        intents::IntentBus,
        registry::TaskRegistry,
        scope::Scope,
        state::StateStream,
    },
    error::EngineError,
    events::{Bus, Event, EventKind},
};

/// Runs one [`Handler`]: accepts intents, exposes state and effects.
pub struct Engine<H: Handler> {
    pub(super) handler: Arc<H>,
    pub(super) cfg: Arc<EngineConfig>,
    pub(super) bus: Bus,
    pub(super) scope: Scope<H::State, H::Effect>,
    pub(super) effects: EffectChannel<H::Effect>,
    pub(super) tasks: TaskRegistry,
    pub(super) intents: IntentBus<H::Intent>,
    pub(super) runtime_token: CancellationToken,
    pub(super) dispatcher: Mutex<Option<JoinHandle<()>>>,
    pub(super) shut_down: AtomicBool,
}

impl<H: Handler> Engine<H> {
    /// Returns a builder for an engine driving `handler`.
    pub fn builder(handler: H) -> EngineBuilder<H> {
        EngineBuilder::new(handler)
    }

    /// Engine with the default configuration and no subscribers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(handler: H) -> Self {
        Self::builder(handler).build()
    }

    /// Queues one intent. Never blocks.
    pub fn submit(&self, intent: H::Intent) -> Result<(), EngineError> {
        self.intents.submit(intent)
    }

    /// Queues several intents as one contiguous batch, in iteration order.
    pub fn submit_all(&self, intents: impl IntoIterator<Item = H::Intent>) -> Result<(), EngineError> {
        self.intents.submit_all(intents.into_iter().collect())
    }

    /// Latest committed state.
    ///
    /// Not guaranteed to reflect intents submitted but not yet handled.
    pub fn current_state(&self) -> H::State {
        self.scope.current_state()
    }

    /// Stream of `mapper(state)`, current value first, consecutive duplicates suppressed.
    pub fn observe_state<T, F>(&self, mapper: F) -> StateStream<T>
    where
        F: Fn(&H::State) -> T + Send + 'static,
        T: Clone + PartialEq + Send + 'static,
    {
        self.scope.container().observe(mapper)
    }

    /// Stream of whole states, current value first.
    pub fn states(&self) -> StateStream<H::State> {
        self.scope.container().observe(<H::State as Clone>::clone)
    }

    /// New consumer handle on the effect channel.
    ///
    /// Each effect reaches exactly one consumer.
    pub fn effects(&self) -> EffectReceiver<H::Effect> {
        self.effects.receiver()
    }

    /// Runtime event bus (subscribe for diagnostics).
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// The handler driving this engine.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Tears the engine down. Returns `true` only for the call that did it.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        let name = self.handler.name();
        tracing::debug!(handler = name, "engine shutting down");

        self.bus
            .publish(Event::new(EventKind::ShutdownRequested).with_reason(name));
        self.runtime_token.cancel();
        self.tasks.shutdown();
        self.effects.close();
        true
    }

    /// True once [`shutdown`](Self::shutdown) ran (explicitly or via drop).
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Waits for the dispatch loop to exit. Only resolves after shutdown.
    pub async fn stopped(&self) {
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(handler = self.handler.name(), %err, "dispatch loop aborted");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn scope(&self) -> &Scope<H::State, H::Effect> {
        &self.scope
    }
}

impl<H: Handler> Drop for Engine<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
