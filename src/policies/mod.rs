//! Scheduling policies.
//!
//! This module groups the knobs that control **if/when** a failed operation is
//! retried and **how long** to wait between attempts.
//!
//! ## Contents
//! - [`RetryPolicy`] bounded retry with linear backoff (`base × (n + 1)`)
//!
//! ## Quick wiring
//! ```text
//! Scope::with_retry(policy, op, completion)
//!      └─► core::retry::run_with_retry uses:
//!           - policy.has_next(n) to decide continue/exit
//!           - policy.delay_after(n) to schedule the next attempt
//! ```

mod retry;

pub use retry::RetryPolicy;
