use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        config::EngineConfig,
        effects::EffectChannel,
        engine::Engine,
        handler::Handler,
        intents::{spawn_dispatch, IntentBus},
        registry::TaskRegistry,
        scope::Scope,
        state::StateContainer,
    },
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing an [`Engine`] with optional features.
pub struct EngineBuilder<H: Handler> {
    handler: H,
    cfg: EngineConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<H: Handler> EngineBuilder<H> {
    /// Creates a builder with the default configuration.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            cfg: EngineConfig::default(),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, cfg: EngineConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (dispatch, task lifecycle, retries, etc.)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the engine and starts its dispatch loop.
    ///
    /// Initializes, in order:
    /// - event bus and (if any subscribers) the subscriber listener
    /// - state container seeded with `handler.initial_state()`
    /// - effect channel, task registry, intent queue
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Engine<H> {
        let cfg = Arc::new(self.cfg);
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let runtime_token = CancellationToken::new();

        if !self.subscribers.is_empty() {
            let subs = SubscriberSet::new(self.subscribers, bus.clone());
            subscriber_listener(&bus, subs, runtime_token.clone());
        }

        let handler = Arc::new(self.handler);
        let state = Arc::new(StateContainer::new(handler.initial_state()));
        let effects = EffectChannel::new(cfg.effect_capacity_clamped(), bus.clone());
        let tasks = TaskRegistry::new(bus.clone(), runtime_token.child_token());
        let scope = Scope::new(
            state,
            effects.clone(),
            tasks.clone(),
            bus.clone(),
            Arc::clone(&cfg),
        );

        let (intents, queue) = IntentBus::channel(runtime_token.clone());
        let dispatcher = {
            let handler = Arc::clone(&handler);
            let scope = scope.clone();
            spawn_dispatch(queue, bus.clone(), handler.name(), move |intent| {
                handler.handle(&scope, intent)
            })
        };

        Engine {
            handler,
            cfg,
            bus,
            scope,
            effects,
            tasks,
            intents,
            runtime_token,
            dispatcher: Mutex::new(Some(dispatcher)),
            shut_down: AtomicBool::new(false),
        }
    }
}

/// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
///
/// On shutdown, drains what is already on the bus, then lets the workers finish.
fn subscriber_listener(bus: &Bus, set: SubscriberSet, token: CancellationToken) {
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                res = rx.recv() => match res {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "subscriber listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = token.cancelled() => {
                    loop {
                        match rx.try_recv() {
                            Ok(ev) => set.emit(&ev),
                            Err(TryRecvError::Lagged(_)) => continue,
                            Err(_) => break,
                        }
                    }
                    break;
                }
            }
        }
        set.shutdown().await;
    });
}
