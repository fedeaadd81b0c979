//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the dispatch loop, the task
//! registry, the retry runner, the rate limiter and the effect channel.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `IntentBus` dispatch loop, `TaskRegistry`, `core::retry`,
//!   `RateLimiter`, `EffectChannel`, `Engine::shutdown`, `SubscriberSet` workers.
//! - **Consumers**: the engine's subscriber listener (fans out to `SubscriberSet`),
//!   plus anyone holding [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};

pub(crate) use event::panic_info;
