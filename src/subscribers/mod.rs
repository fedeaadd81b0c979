//! # Event subscribers for the statevisor engine.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out,
//! and, with the `logging` feature, the built-in `LogWriter`.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Engine parts ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet
//!                                                                   │
//!                                                   ┌───────────────┼──────────┐
//!                                                   ▼               ▼          ▼
//!                                               LogWriter        Metrics     Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
