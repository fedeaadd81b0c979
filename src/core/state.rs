//! # StateContainer: single owner of the current state value.
//!
//! Holds exactly one committed `S` and exposes read access plus atomic,
//! reducer-based mutation. Built on [`tokio::sync::watch`]: the sender's internal
//! lock is the single mutation point, so every reducer runs against the result
//! of every update that precedes it.
//!
//! ## Rules
//! - `current()` never blocks on the async runtime and always returns a fully-formed value
//! - `update(reducer)` runs the reducer **while holding exclusive access**; the
//!   result becomes current in one step
//! - an update whose result equals the previous value (`PartialEq`) is **not a change**:
//!   the value is kept and no observer is woken
//! - observers see the latest value; intermediate values may be skipped under load
//! - reducers must not call back into the same container (the lock is not re-entrant)
//!
//! ## Observation
//! ```text
//! update(r1) ──► [S1] ──► changed ──► observe(mapper): mapper(S1) != last ? yield
//! update(r2) ──► [S1] (equal)     ──► (nothing)
//! update(r3) ──► [S3] ──► changed ──► observe(mapper): mapper(S3) == last ? skip
//! ```

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;

/// Lazy, restartable stream of observed state values.
pub type StateStream<T> = BoxStream<'static, T>;

/// Owner of the current state.
pub struct StateContainer<S> {
    tx: watch::Sender<S>,
    initial: S,
}

impl<S> StateContainer<S>
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    /// Creates a container whose current (and reset) value is `initial`.
    pub fn new(initial: S) -> Self {
        let (tx, _rx) = watch::channel(initial.clone());
        Self { tx, initial }
    }

    /// Returns a clone of the latest committed value.
    pub fn current(&self) -> S {
        self.tx.borrow().clone()
    }

    /// Applies `reducer` atomically.
    ///
    /// Returns `true` if the state changed (observers will be woken).
    pub fn update<F>(&self, reducer: F) -> bool
    where
        F: FnOnce(&S) -> S,
    {
        self.tx.send_if_modified(|state| {
            let next = reducer(state);
            if next == *state {
                false
            } else {
                *state = next;
                true
            }
        })
    }

    /// Replaces the state wholesale. Returns `true` if it changed.
    pub fn replace(&self, next: S) -> bool {
        self.update(move |_| next)
    }

    /// Restores the initial value. Returns `true` if it changed.
    pub fn reset(&self) -> bool {
        self.replace(self.initial.clone())
    }

    /// Raw change-notification receiver.
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }

    /// Stream of `mapper(state)` values: the current one first, then one per change,
    /// with consecutive equal mapped values suppressed.
    ///
    /// Each call starts an independent subscription. The stream ends once the
    /// container is dropped.
    pub fn observe<T, F>(&self, mapper: F) -> StateStream<T>
    where
        F: Fn(&S) -> T + Send + 'static,
        T: Clone + PartialEq + Send + 'static,
    {
        let rx = self.tx.subscribe();
        stream::unfold(
            (rx, None::<T>, mapper, true),
            |(mut rx, mut last, mapper, mut first)| async move {
                loop {
                    if !first && rx.changed().await.is_err() {
                        return None;
                    }
                    first = false;
                    let value = {
                        let state = rx.borrow_and_update();
                        mapper(&state)
                    };
                    if last.as_ref() != Some(&value) {
                        last = Some(value.clone());
                        return Some((value, (rx, last, mapper, false)));
                    }
                }
            },
        )
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Form {
        query: String,
        loading: bool,
    }

    fn form() -> Form {
        Form {
            query: String::new(),
            loading: false,
        }
    }

    #[test]
    fn update_reports_whether_state_changed() {
        let c = StateContainer::new(form());
        assert!(c.update(|s| Form {
            loading: true,
            ..s.clone()
        }));
        assert!(!c.update(|s| s.clone()));
        assert!(c.current().loading);
    }

    #[test]
    fn reset_restores_initial_value() {
        let c = StateContainer::new(form());
        c.replace(Form {
            query: "rust".into(),
            loading: true,
        });
        assert!(c.reset());
        assert_eq!(c.current(), form());
        assert!(!c.reset());
    }

    #[tokio::test]
    async fn observe_emits_current_then_distinct_mapped_changes() {
        let c = StateContainer::new(form());
        let mut loading = c.observe(|s: &Form| s.loading);

        assert_eq!(loading.next().await, Some(false));

        // Changes the state, but not the mapped value: suppressed.
        c.update(|s| Form {
            query: "a".into(),
            ..s.clone()
        });
        c.update(|s| Form {
            loading: true,
            ..s.clone()
        });
        assert_eq!(loading.next().await, Some(true));

        let pending = tokio::time::timeout(Duration::from_millis(20), loading.next()).await;
        assert!(pending.is_err(), "no change, no emission");
    }

    #[tokio::test]
    async fn observe_is_restartable() {
        let c = StateContainer::new(1_u32);
        c.replace(2);
        let mut first = c.observe(|v: &u32| *v);
        assert_eq!(first.next().await, Some(2));
        drop(first);

        c.replace(3);
        let mut second = c.observe(|v: &u32| *v);
        assert_eq!(second.next().await, Some(3));
    }

    #[tokio::test]
    async fn observe_ends_when_container_dropped() {
        let c = StateContainer::new(0_u8);
        let mut s = c.observe(|v: &u8| *v);
        assert_eq!(s.next().await, Some(0));
        drop(c);
        assert_eq!(s.next().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_never_lose_a_reducer() {
        let c = Arc::new(StateContainer::new(0_u64));
        let mut joins = Vec::new();
        for _ in 0..64 {
            let c = Arc::clone(&c);
            joins.push(tokio::spawn(async move {
                for _ in 0..50 {
                    c.update(|n| n + 1);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for j in joins {
            j.await.unwrap();
        }
        assert_eq!(c.current(), 64 * 50);
    }
}
