//! Runtime core: state, effects, tasks and their composition.
//!
//! The public entry point is [`Engine`], built from a [`Handler`]. The building
//! blocks are exported too, for use on their own.
//!
//! Internal modules:
//! - [`state`]: single-owner state container with atomic reducers and observation;
//! - [`effects`]: bounded drop-oldest effect channel;
//! - [`registry`]: keyed/anonymous task registry with cancel-and-replace;
//! - [`retry`]: bounded retry runner with linear backoff;
//! - [`limiter`]: debounce and throttle over the registry;
//! - [`intents`]: ordered intent queue and dispatch loop;
//! - [`scope`]: handler-facing primitives;
//! - [`engine`] / [`builder`]: composition root and its builder.

mod builder;
mod completion;
mod config;
mod effects;
mod engine;
mod handler;
mod intents;
mod limiter;
mod registry;
mod retry;
mod scope;
mod state;

pub use builder::EngineBuilder;
pub use completion::Completion;
pub use config::EngineConfig;
pub use effects::{EffectChannel, EffectReceiver};
pub use engine::Engine;
pub use handler::Handler;
pub use registry::{TaskId, TaskRegistry};
pub use scope::Scope;
pub use state::{StateContainer, StateStream};
