//! # RateLimiter: debounce and throttle on top of the task registry.
//!
//! Both primitives reuse keyed tasks under prefixed registry keys. The prefixes
//! share the registry's key space, so a user task keyed `throttle_save` occupies
//! the same slot as `throttle("save", ..)`:
//! - debounce: `debounce_{key}`: a delayed task, **replaced** on every call
//! - throttle: `throttle_{key}`: a cooldown task, **never replaced** while alive
//!
//! ```text
//! debounce("q", 500ms)  t=0   ─► slot: sleep(500) → action      (A)
//! debounce("q", 500ms)  t=100 ─► cancel A, slot: sleep(500) → action (B)
//!                       t=600 ─► B fires, exactly once
//!
//! throttle("b", 1s)     t=0   ─► slot vacant: register cooldown, run action now
//! throttle("b", 1s)     t=200 ─► slot busy: drop (ThrottleDropped)
//! throttle("b", 1s)     t=1100 ─► cooldown over, slot vacant: run again
//! ```
//!
//! The throttle cooldown is registered **before** the action runs, so a
//! second call racing the first can never run it twice.

use std::time::Duration;

use tokio::time;

use crate::{
    core::registry::{TaskId, TaskRegistry},
    error::EngineError,
    events::{Bus, Event, EventKind},
};

#[derive(Clone)]
pub(crate) struct RateLimiter {
    tasks: TaskRegistry,
    bus: Bus,
}

impl RateLimiter {
    pub(crate) fn new(tasks: TaskRegistry, bus: Bus) -> Self {
        Self { tasks, bus }
    }

    /// Runs `action` once `delay` elapses with no newer call for the same key.
    pub(crate) fn debounce<A>(
        &self,
        key: &str,
        delay: Duration,
        action: A,
    ) -> Result<TaskId, EngineError>
    where
        A: FnOnce() + Send + 'static,
    {
        self.tasks.run(Some(&debounce_key(key)), move |_ctx| async move {
            time::sleep(delay).await;
            action();
        })
    }

    /// Runs `action` immediately unless the key is cooling down.
    ///
    /// Returns whether the action ran.
    pub(crate) fn throttle<A>(
        &self,
        key: &str,
        interval: Duration,
        action: A,
    ) -> Result<bool, EngineError>
    where
        A: FnOnce(),
    {
        let slot = throttle_key(key);
        let cooldown = self
            .tasks
            .run_if_vacant(&slot, move |_ctx| time::sleep(interval))?;

        match cooldown {
            Some(_) => {
                action();
                Ok(true)
            }
            None => {
                self.bus
                    .publish(Event::new(EventKind::ThrottleDropped).with_key(slot));
                Ok(false)
            }
        }
    }
}

fn debounce_key(key: &str) -> String {
    format!("debounce_{key}")
}

fn throttle_key(key: &str) -> String {
    format!("throttle_{key}")
}
