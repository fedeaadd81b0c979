//! # Scope: the primitives a handler works with.
//!
//! Every handler call receives a `&Scope<S, E>`. It is cheap to clone and may be
//! moved into background tasks, which is how async work reports back into state
//! and effects.
//!
//! ## Surface
//! ```text
//! state    current_state · set_state · replace_state · reset_state · with_state
//! effects  send_effect · send_effects
//! tasks    launch · run_keyed · cancel_keyed · cancel_all_keyed · is_running
//! results  execute · execute_keyed · with_retry · with_retry_keyed · collect
//! limits   debounce · throttle
//! ```
//!
//! Calls made after the engine shut down fail with [`EngineError`] and are logged
//! at `warn`; state reads keep working.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        completion::Completion,
        config::EngineConfig,
        effects::EffectChannel,
        limiter::RateLimiter,
        registry::{TaskId, TaskRegistry},
        retry::run_with_retry,
        state::StateContainer,
    },
    error::{EngineError, OperationFailure, TaskError},
    events::Bus,
    policies::RetryPolicy,
};

/// Handle on one engine's state, effects and background tasks.
pub struct Scope<S, E> {
    state: Arc<StateContainer<S>>,
    effects: EffectChannel<E>,
    tasks: TaskRegistry,
    limiter: RateLimiter,
    bus: Bus,
    cfg: Arc<EngineConfig>,
}

impl<S, E> Clone for Scope<S, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            effects: self.effects.clone(),
            tasks: self.tasks.clone(),
            limiter: self.limiter.clone(),
            bus: self.bus.clone(),
            cfg: Arc::clone(&self.cfg),
        }
    }
}

impl<S, E> Scope<S, E>
where
    S: Clone + PartialEq + Send + Sync + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(
        state: Arc<StateContainer<S>>,
        effects: EffectChannel<E>,
        tasks: TaskRegistry,
        bus: Bus,
        cfg: Arc<EngineConfig>,
    ) -> Self {
        let limiter = RateLimiter::new(tasks.clone(), bus.clone());
        Self {
            state,
            effects,
            tasks,
            limiter,
            bus,
            cfg,
        }
    }

    // ---- state ----

    /// Latest committed state.
    pub fn current_state(&self) -> S {
        self.state.current()
    }

    /// Applies `reducer` atomically. Returns `true` if the state changed.
    ///
    /// The reducer must not call back into this scope's state.
    pub fn set_state(&self, reducer: impl FnOnce(&S) -> S) -> bool {
        self.state.update(reducer)
    }

    /// Replaces the state wholesale. Returns `true` if it changed.
    pub fn replace_state(&self, next: S) -> bool {
        self.state.replace(next)
    }

    /// Restores the handler's initial state. Returns `true` if it changed.
    pub fn reset_state(&self) -> bool {
        self.state.reset()
    }

    /// Runs `action` with a snapshot of the state if `predicate` holds for it.
    ///
    /// Predicate and action see the same snapshot. Returns whether the action ran.
    pub fn with_state(&self, predicate: impl FnOnce(&S) -> bool, action: impl FnOnce(&S)) -> bool {
        let snapshot = self.state.current();
        if predicate(&snapshot) {
            action(&snapshot);
            true
        } else {
            false
        }
    }

    // ---- effects ----

    /// Emits one effect.
    pub fn send_effect(&self, effect: E) -> Result<(), EngineError> {
        logged("send_effect", self.effects.send(effect))
    }

    /// Emits several effects in order. Stops at the first refusal.
    pub fn send_effects(&self, effects: impl IntoIterator<Item = E>) -> Result<(), EngineError> {
        for effect in effects {
            self.send_effect(effect)?;
        }
        Ok(())
    }

    // ---- tasks ----

    /// Starts an anonymous background task.
    pub fn launch<F, Fut>(&self, op: F) -> Result<TaskId, EngineError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        logged("launch", self.tasks.run(None, op))
    }

    /// Starts a task under `key`, cancelling whatever ran there before.
    pub fn run_keyed<F, Fut>(&self, key: &str, op: F) -> Result<TaskId, EngineError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        logged("run_keyed", self.tasks.run(Some(key), op))
    }

    /// Cancels the task under `key`. Returns `false` if none was running.
    pub fn cancel_keyed(&self, key: &str) -> bool {
        self.tasks.cancel(key)
    }

    /// Cancels every running task, keyed or not. Returns how many keys were cleared.
    pub fn cancel_all_keyed(&self) -> usize {
        self.tasks.cancel_all()
    }

    /// True while a task is registered under `key`.
    pub fn is_running(&self, key: &str) -> bool {
        self.tasks.is_running(key)
    }

    // ---- results ----

    /// Runs `op` in the background and routes its outcome to `completion`.
    pub fn execute<T, F, Fut>(&self, op: F, completion: Completion<T>) -> Result<TaskId, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        self.spawn_execute(None, op, completion)
    }

    /// Like [`execute`](Self::execute), replacing any task under `key`.
    ///
    /// A replaced operation never reaches `on_success` or `on_error`; its
    /// `on_finally` still runs.
    pub fn execute_keyed<T, F, Fut>(
        &self,
        key: &str,
        op: F,
        completion: Completion<T>,
    ) -> Result<TaskId, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        self.spawn_execute(Some(key), op, completion)
    }

    /// Runs `op` with up to `policy.max_retries` retries and linear backoff.
    ///
    /// `on_error` receives only the last failure. `on_finally` runs once the
    /// whole retry sequence ends, including by cancellation.
    pub fn with_retry<T, F, Fut>(
        &self,
        policy: RetryPolicy,
        op: F,
        completion: Completion<T>,
    ) -> Result<TaskId, EngineError>
    where
        T: Send + 'static,
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        self.spawn_retry(None, policy, op, completion)
    }

    /// Like [`with_retry`](Self::with_retry), replacing any task under `key`.
    pub fn with_retry_keyed<T, F, Fut>(
        &self,
        key: &str,
        policy: RetryPolicy,
        op: F,
        completion: Completion<T>,
    ) -> Result<TaskId, EngineError>
    where
        T: Send + 'static,
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        self.spawn_retry(Some(key), policy, op, completion)
    }

    /// Consumes `stream` in the background: every `Ok` item goes to `on_item`,
    /// the first `Err` goes to `on_error` and ends collection.
    pub fn collect<T, St, N, R>(&self, stream: St, on_item: N, on_error: R) -> Result<TaskId, EngineError>
    where
        T: Send + 'static,
        St: Stream<Item = Result<T, OperationFailure>> + Send + 'static,
        N: FnMut(T) + Send + 'static,
        R: FnOnce(OperationFailure) + Send + 'static,
    {
        let res = self.tasks.run(None, move |_ctx| async move {
            let mut on_item = on_item;
            futures::pin_mut!(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(value) => on_item(value),
                    Err(failure) => {
                        on_error(failure);
                        break;
                    }
                }
            }
        });
        logged("collect", res)
    }

    // ---- limits ----

    /// Runs `action` once `delay` passes with no newer `debounce` call for `key`.
    pub fn debounce(
        &self,
        key: &str,
        delay: Duration,
        action: impl FnOnce() + Send + 'static,
    ) -> Result<TaskId, EngineError> {
        logged("debounce", self.limiter.debounce(key, delay, action))
    }

    /// Runs `action` now unless `key` ran within the last `interval`.
    ///
    /// Returns whether the action ran.
    pub fn throttle(&self, key: &str, interval: Duration, action: impl FnOnce()) -> Result<bool, EngineError> {
        logged("throttle", self.limiter.throttle(key, interval, action))
    }

    // ---- misc ----

    pub(crate) fn container(&self) -> &StateContainer<S> {
        &self.state
    }

    /// False once the engine has shut down.
    pub fn is_active(&self) -> bool {
        !self.tasks.is_terminated()
    }

    /// Engine configuration (policy defaults).
    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Runtime event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    fn spawn_execute<T, F, Fut>(
        &self,
        key: Option<&str>,
        op: F,
        completion: Completion<T>,
    ) -> Result<TaskId, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let res = self.tasks.run(key, move |ctx| async move {
            let pending = completion.start();
            let outcome = op(ctx).await;
            pending.resolve(outcome);
        });
        logged("execute", res)
    }

    fn spawn_retry<T, F, Fut>(
        &self,
        key: Option<&str>,
        policy: RetryPolicy,
        op: F,
        completion: Completion<T>,
    ) -> Result<TaskId, EngineError>
    where
        T: Send + 'static,
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let bus = self.bus.clone();
        let label = key.map(str::to_owned);
        let res = self.tasks.run(key, move |ctx| async move {
            let pending = completion.start();
            let outcome = run_with_retry(policy, label.as_deref(), &bus, &ctx, op).await;
            pending.resolve(outcome);
        });
        logged("with_retry", res)
    }
}

fn logged<T>(op: &'static str, res: Result<T, EngineError>) -> Result<T, EngineError> {
    if let Err(err) = &res {
        tracing::warn!(op, err = %err, "scope call refused");
    }
    res
}
