//! # Task registry - keyed, cancellable background work.
//!
//! The registry owns every background task the engine runs:
//! - `run(Some(key), op)` → cancel the current occupant of `key` (if any), spawn `op`
//! - `run(None, op)` → spawn an anonymous task (bulk-cancellable only)
//! - `cancel(key)` → cancel and deregister one keyed task
//! - `cancel_all()` → cancel every task, keyed and anonymous; registry stays usable
//! - `shutdown()` → like `cancel_all`, then refuse all later work
//!
//! ## Architecture
//! ```text
//! root token (engine lifetime)
//!   └─► epoch token (replaced by cancel_all)
//!         ├─► task token #1  ("search")
//!         ├─► task token #2  (anonymous)
//!         └─► task token #3  ("load-user")
//!
//! run("search", op) while #1 occupies "search":
//!   lock ─► remove #1 ─► cancel #1 ─► spawn #4(await join(#1); op) ─► insert #4 ─► unlock
//! ```
//!
//! ## Rules
//! - At most **one live task per key**: a replacement does not start its operation
//!   until the displaced task has unwound
//! - Cancellation is enforced at the next suspension point: the operation future
//!   is raced against its token and dropped, so it can never reach code after
//!   the await it was parked on
//! - The rule holds after `cancel` and `cancel_all` too: a cancelled task stays
//!   in a per-key drain list until it unwinds, and the next task started under
//!   that key waits for it
//! - Finished tasks deregister themselves **by identity**: a displaced task never
//!   removes its replacement
//! - Panics inside operations are caught and reported as `TaskPanicked`

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::events::{panic_info, Bus, Event, EventKind};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a registered task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value (as reported in runtime events).
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Handle to a running keyed task.
struct Slot {
    id: TaskId,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// A cancelled keyed task that may still be unwinding.
struct Draining {
    id: TaskId,
    join: JoinHandle<()>,
}

struct Slots {
    keyed: HashMap<Arc<str>, Slot>,
    draining: HashMap<Arc<str>, Draining>,
    epoch: CancellationToken,
    terminated: bool,
}

struct Shared {
    slots: Mutex<Slots>,
    root: CancellationToken,
    bus: Bus,
}

/// How a task ended.
enum Outcome {
    Finished,
    Cancelled,
    Panicked(String),
}

/// Registry of running background tasks. Cheap to clone.
#[derive(Clone)]
pub struct TaskRegistry {
    shared: Arc<Shared>,
}

impl TaskRegistry {
    /// Creates an empty registry whose tasks all descend from `root`.
    pub fn new(bus: Bus, root: CancellationToken) -> Self {
        let epoch = root.child_token();
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(Slots {
                    keyed: HashMap::new(),
                    draining: HashMap::new(),
                    epoch,
                    terminated: false,
                }),
                root,
                bus,
            }),
        }
    }

    /// Spawns `op` as a cancellable task, replacing the occupant of `key` if any.
    ///
    /// `op` receives the task's [`CancellationToken`]; it may check it, but it
    /// does not have to: the task is dropped at its next suspension point once
    /// cancelled. Must be called from within a Tokio runtime.
    pub fn run<F, Fut>(&self, key: Option<&str>, op: F) -> Result<TaskId, EngineError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.shared.slots.lock();
        if slots.terminated {
            return Err(EngineError::Terminated);
        }
        Ok(self.spawn_locked(&mut slots, key, op))
    }

    /// Spawns `op` under `key` only if no task currently occupies it.
    ///
    /// The occupancy check and the registration happen in one critical section.
    /// Returns `Ok(None)` if the key was occupied.
    pub fn run_if_vacant<F, Fut>(&self, key: &str, op: F) -> Result<Option<TaskId>, EngineError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.shared.slots.lock();
        if slots.terminated {
            return Err(EngineError::Terminated);
        }
        if slots.keyed.contains_key(key) {
            return Ok(None);
        }
        Ok(Some(self.spawn_locked(&mut slots, Some(key), op)))
    }

    /// Cancels and deregisters the task under `key`. Returns `false` if there was none.
    pub fn cancel(&self, key: &str) -> bool {
        let mut slots = self.shared.slots.lock();
        let Some((key, slot)) = slots.keyed.remove_entry(key) else {
            return false;
        };
        slot.cancel.cancel();
        slots.draining.insert(
            key,
            Draining {
                id: slot.id,
                join: slot.join,
            },
        );
        true
    }

    /// Cancels every task (keyed and anonymous) and clears the registry.
    ///
    /// The registry remains usable. Returns the number of keyed tasks cancelled.
    pub fn cancel_all(&self) -> usize {
        let (count, old_epoch) = {
            let mut slots = self.shared.slots.lock();
            let fresh = self.shared.root.child_token();
            let old_epoch = std::mem::replace(&mut slots.epoch, fresh);
            let drained: Vec<(Arc<str>, Slot)> = slots.keyed.drain().collect();
            let count = drained.len();
            for (key, slot) in drained {
                slots.draining.insert(
                    key,
                    Draining {
                        id: slot.id,
                        join: slot.join,
                    },
                );
            }
            (count, old_epoch)
        };
        old_epoch.cancel();
        count
    }

    /// Cancels every task and makes the registry terminal.
    ///
    /// Idempotent: returns `true` only for the call that shut it down.
    pub fn shutdown(&self) -> bool {
        {
            let mut slots = self.shared.slots.lock();
            if slots.terminated {
                return false;
            }
            slots.terminated = true;
            slots.keyed.clear();
            slots.draining.clear();
        }
        self.shared.root.cancel();
        true
    }

    /// True if a task currently occupies `key`.
    pub fn is_running(&self, key: &str) -> bool {
        self.shared.slots.lock().keyed.contains_key(key)
    }

    /// Number of occupied keys.
    pub fn len(&self) -> usize {
        self.shared.slots.lock().keyed.len()
    }

    /// True if no key is occupied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once [`shutdown`](Self::shutdown) has run.
    pub fn is_terminated(&self) -> bool {
        self.shared.slots.lock().terminated
    }

    /// Displaces, spawns and registers while the caller holds the slot lock.
    fn spawn_locked<F, Fut>(&self, slots: &mut Slots, key: Option<&str>, op: F) -> TaskId
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = TaskId::next();
        let key: Option<Arc<str>> = key.map(Arc::from);
        let token = slots.epoch.child_token();

        let displaced = key.as_ref().and_then(|k| match slots.keyed.remove(k) {
            Some(prev) => {
                prev.cancel.cancel();
                self.shared.bus.publish(
                    Event::new(EventKind::TaskReplaced)
                        .with_key(Arc::clone(k))
                        .with_task_id(prev.id.get()),
                );
                Some(prev.join)
            }
            None => slots.draining.remove(k).map(|d| d.join),
        });
        self.shared.bus.publish(
            Event::new(EventKind::TaskStarted)
                .with_key_opt(key.as_deref())
                .with_task_id(id.get()),
        );

        let join = tokio::spawn(self.clone().drive(
            id,
            key.clone(),
            token.clone(),
            displaced,
            op,
        ));

        if let Some(key) = key {
            slots.keyed.insert(
                key,
                Slot {
                    id,
                    cancel: token,
                    join,
                },
            );
        }
        id
    }

    /// Body of every spawned task.
    async fn drive<F, Fut>(
        self,
        id: TaskId,
        key: Option<Arc<str>>,
        token: CancellationToken,
        displaced: Option<JoinHandle<()>>,
        op: F,
    ) where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(prev) = displaced {
            // The displaced task is already cancelled; wait for it to unwind.
            let _ = prev.await;
        }

        let outcome = if token.is_cancelled() {
            Outcome::Cancelled
        } else {
            let child = token.clone();
            let work = std::panic::AssertUnwindSafe(async move { op(child).await }).catch_unwind();
            tokio::select! {
                biased;
                _ = token.cancelled() => Outcome::Cancelled,
                res = work => match res {
                    Ok(()) => Outcome::Finished,
                    Err(payload) => Outcome::Panicked(panic_info(&*payload)),
                },
            }
        };

        self.deregister(id, key.as_deref());
        self.report(id, key.as_deref(), outcome);
    }

    /// Removes the slot (or drain entry) under `key` only if `id` still owns it.
    fn deregister(&self, id: TaskId, key: Option<&str>) {
        let Some(key) = key else { return };
        let mut slots = self.shared.slots.lock();
        if slots.keyed.get(key).is_some_and(|slot| slot.id == id) {
            slots.keyed.remove(key);
        }
        if slots.draining.get(key).is_some_and(|d| d.id == id) {
            slots.draining.remove(key);
        }
    }

    fn report(&self, id: TaskId, key: Option<&str>, outcome: Outcome) {
        let ev = match outcome {
            Outcome::Finished => Event::new(EventKind::TaskFinished),
            Outcome::Cancelled => Event::new(EventKind::TaskCancelled),
            Outcome::Panicked(info) => {
                tracing::error!(task = %id, key, %info, "background task panicked");
                Event::new(EventKind::TaskPanicked).with_reason(info)
            }
        };
        self.shared
            .bus
            .publish(ev.with_key_opt(key).with_task_id(id.get()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use super::*;

    fn registry() -> TaskRegistry {
        TaskRegistry::new(Bus::new(64), CancellationToken::new())
    }

    /// Sets its flag when dropped before `complete()` is called.
    struct UnwindProbe {
        flag: Arc<AtomicBool>,
        completed: bool,
    }

    impl UnwindProbe {
        fn new(flag: &Arc<AtomicBool>) -> Self {
            Self {
                flag: Arc::clone(flag),
                completed: false,
            }
        }
        fn complete(mut self) {
            self.completed = true;
        }
    }

    impl Drop for UnwindProbe {
        fn drop(&mut self) {
            if !self.completed {
                self.flag.store(true, Ordering::SeqCst);
            }
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn replacement_waits_for_displaced_task_to_unwind() {
        let reg = registry();
        let a_unwound = Arc::new(AtomicBool::new(false));
        let a_callback = Arc::new(AtomicBool::new(false));
        let b_saw_a_unwound = Arc::new(AtomicBool::new(false));

        {
            let unwound = Arc::clone(&a_unwound);
            let callback = Arc::clone(&a_callback);
            reg.run(Some("k"), move |_ctx| async move {
                let probe = UnwindProbe::new(&unwound);
                tokio::time::sleep(Duration::from_secs(10)).await;
                probe.complete();
                callback.store(true, Ordering::SeqCst);
            })
            .unwrap();
        }
        settle().await;

        {
            let unwound = Arc::clone(&a_unwound);
            let saw = Arc::clone(&b_saw_a_unwound);
            reg.run(Some("k"), move |_ctx| async move {
                saw.store(unwound.load(Ordering::SeqCst), Ordering::SeqCst);
            })
            .unwrap();
        }

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(b_saw_a_unwound.load(Ordering::SeqCst));
        assert!(a_unwound.load(Ordering::SeqCst));
        assert!(!a_callback.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn swallowing_cancellation_cannot_reach_the_continuation() {
        let reg = registry();
        let continued = Arc::new(AtomicBool::new(false));

        {
            let continued = Arc::clone(&continued);
            reg.run(Some("k"), move |ctx| async move {
                // Treats cancellation like a normal wake-up: a defect the registry must contain.
                tokio::select! {
                    _ = ctx.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                }
                continued.store(true, Ordering::SeqCst);
            })
            .unwrap();
        }
        settle().await;
        assert!(reg.cancel("k"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!continued.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn displaced_task_does_not_deregister_its_replacement() {
        let reg = registry();
        reg.run(Some("k"), |_ctx| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
        })
        .unwrap();
        reg.run(Some("k"), |_ctx| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(reg.is_running("k"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!reg.is_running("k"));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn cancel_reports_whether_key_existed() {
        let reg = registry();
        assert!(!reg.cancel("missing"));
        reg.run(Some("k"), |ctx| async move { ctx.cancelled().await })
            .unwrap();
        assert!(reg.is_running("k"));
        assert!(reg.cancel("k"));
        assert!(!reg.is_running("k"));
    }

    /// Starts a task under "k" that spends 200ms inside a single poll.
    async fn start_busy(reg: &TaskRegistry, busy: &Arc<AtomicBool>) {
        let flag = Arc::clone(busy);
        reg.run(Some("k"), move |_ctx| async move {
            flag.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            flag.store(false, Ordering::SeqCst);
            tokio::task::yield_now().await;
        })
        .unwrap();
        while !busy.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Starts the next task under "k"; returns whether it ran while the busy one was mid-poll.
    async fn next_overlaps(reg: &TaskRegistry, busy: &Arc<AtomicBool>) -> bool {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let flag = Arc::clone(busy);
        reg.run(Some("k"), move |_ctx| async move {
            let _ = tx.send(flag.load(Ordering::SeqCst));
        })
        .unwrap();
        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("next task never ran")
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn replacement_never_overlaps_a_busy_occupant() {
        let reg = registry();
        let busy = Arc::new(AtomicBool::new(false));
        start_busy(&reg, &busy).await;
        assert!(!next_overlaps(&reg, &busy).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_after_cancel_waits_for_the_cancelled_task() {
        let reg = registry();
        let busy = Arc::new(AtomicBool::new(false));
        start_busy(&reg, &busy).await;
        assert!(reg.cancel("k"));
        assert!(!reg.is_running("k"));
        assert!(!next_overlaps(&reg, &busy).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_after_cancel_all_waits_for_the_cancelled_task() {
        let reg = registry();
        let busy = Arc::new(AtomicBool::new(false));
        start_busy(&reg, &busy).await;
        assert_eq!(reg.cancel_all(), 1);
        assert!(!next_overlaps(&reg, &busy).await);
    }

    #[tokio::test]
    async fn drained_tasks_leave_no_trace() {
        let reg = registry();
        reg.run(Some("k"), |ctx| async move { ctx.cancelled().await })
            .unwrap();
        settle().await;
        assert!(reg.cancel("k"));
        settle().await;
        assert!(reg.shared.slots.lock().draining.is_empty());
    }

    #[tokio::test]
    async fn cancel_all_reaches_anonymous_tasks_and_keeps_registry_usable() {
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let reg = TaskRegistry::new(bus, CancellationToken::new());

        for key in [Some("a"), None, None] {
            reg.run(key, |ctx| async move { ctx.cancelled().await })
                .unwrap();
        }
        settle().await;

        assert_eq!(reg.cancel_all(), 1);
        assert!(reg.is_empty());
        settle().await;

        let mut cancelled = 0;
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::TaskCancelled {
                cancelled += 1;
            }
        }
        assert_eq!(cancelled, 3);

        let ran = Arc::new(AtomicBool::new(false));
        {
            let ran = Arc::clone(&ran);
            reg.run(Some("a"), move |_ctx| async move {
                ran.store(true, Ordering::SeqCst);
            })
            .unwrap();
        }
        settle().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_is_terminal_and_idempotent() {
        let reg = registry();
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let cancelled = Arc::clone(&cancelled);
            reg.run(None, move |ctx| async move {
                let probe = UnwindProbe::new(&cancelled);
                ctx.cancelled().await;
                // Never reached: the registry drops the future first.
                probe.complete();
            })
            .unwrap();
        }
        settle().await;

        assert!(reg.shutdown());
        assert!(!reg.shutdown());
        assert!(reg.is_terminated());
        settle().await;
        assert!(cancelled.load(Ordering::SeqCst));

        let err = reg.run(Some("late"), |_ctx| async {}).unwrap_err();
        assert_eq!(err, EngineError::Terminated);
        assert_eq!(
            reg.run_if_vacant("late", |_ctx| async {}).unwrap_err(),
            EngineError::Terminated
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_if_vacant_respects_occupancy() {
        let reg = registry();
        let first = reg
            .run_if_vacant("cooldown", |_ctx| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
            })
            .unwrap();
        assert!(first.is_some());
        let second = reg.run_if_vacant("cooldown", |_ctx| async {}).unwrap();
        assert!(second.is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let third = reg.run_if_vacant("cooldown", |_ctx| async {}).unwrap();
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn panicking_task_is_reported_and_deregistered() {
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let reg = TaskRegistry::new(bus, CancellationToken::new());

        let id = reg
            .run(Some("boom"), |_ctx| async { panic!("kaboom") })
            .unwrap();

        let panicked = loop {
            let ev = events.recv().await.unwrap();
            if ev.kind == EventKind::TaskPanicked {
                break ev;
            }
        };
        assert_eq!(panicked.task_id, Some(id.get()));
        assert_eq!(panicked.reason.as_deref(), Some("kaboom"));
        assert!(!reg.is_running("boom"));
    }
}
