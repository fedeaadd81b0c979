//! # IntentBus: ordered, single-consumer intent delivery.
//!
//! Screens submit intents from any task; one dispatch loop hands them to the
//! handler strictly one at a time, in submission order.
//!
//! ## Architecture
//! ```text
//! submit(i)      ──► [unbounded mpsc] ──► dispatch loop ──► handler(i)
//! submit_all(v)  ──►  (one envelope)         │                ├─ Ok      → next
//!                                            │                ├─ Err(f)  → HandlerFailed, next
//!                                            │                └─ panic   → HandlerPanicked, next
//!                                            └─ token cancelled → exit
//! ```
//!
//! ## Rules
//! - submission never blocks and never drops an intent while open
//! - a batch is delivered contiguously (nothing interleaves inside it)
//! - a failing or panicking handler call never stops the loop
//! - after close, `submit` fails with `ChannelClosed { channel: "intent" }`;
//!   intents still queued at close are discarded

use std::panic::{self, AssertUnwindSafe};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{EngineError, OperationFailure},
    events::{panic_info, Bus, Event, EventKind},
};

enum Envelope<I> {
    One(I),
    Batch(Vec<I>),
}

/// Submission side of the intent queue. Cheap to clone.
pub(crate) struct IntentBus<I> {
    tx: mpsc::UnboundedSender<Envelope<I>>,
    closed: CancellationToken,
}

impl<I> Clone for IntentBus<I> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            closed: self.closed.clone(),
        }
    }
}

/// Receiving side, consumed by [`spawn_dispatch`].
pub(crate) struct IntentQueue<I> {
    rx: mpsc::UnboundedReceiver<Envelope<I>>,
    closed: CancellationToken,
}

impl<I: Send + 'static> IntentBus<I> {
    /// Creates an open queue. Cancelling `closed` closes it.
    pub(crate) fn channel(closed: CancellationToken) -> (Self, IntentQueue<I>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                closed: closed.clone(),
            },
            IntentQueue { rx, closed },
        )
    }

    pub(crate) fn submit(&self, intent: I) -> Result<(), EngineError> {
        self.send(Envelope::One(intent))
    }

    pub(crate) fn submit_all(&self, intents: Vec<I>) -> Result<(), EngineError> {
        if intents.is_empty() {
            return self.check_open();
        }
        self.send(Envelope::Batch(intents))
    }

    fn send(&self, envelope: Envelope<I>) -> Result<(), EngineError> {
        self.check_open()?;
        self.tx
            .send(envelope)
            .map_err(|_| EngineError::ChannelClosed { channel: "intent" })
    }

    fn check_open(&self) -> Result<(), EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::ChannelClosed { channel: "intent" });
        }
        Ok(())
    }
}

/// Spawns the dispatch loop: `dispatch` is called once per intent, in order.
///
/// The loop exits when the queue's close token is cancelled.
pub(crate) fn spawn_dispatch<I, D>(
    queue: IntentQueue<I>,
    bus: Bus,
    handler: &'static str,
    mut dispatch: D,
) -> JoinHandle<()>
where
    I: Send + 'static,
    D: FnMut(I) -> Result<(), OperationFailure> + Send + 'static,
{
    let IntentQueue { mut rx, closed } = queue;

    tokio::spawn(async move {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = closed.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            match envelope {
                Envelope::One(intent) => deliver(&mut dispatch, intent, &bus, handler),
                Envelope::Batch(intents) => {
                    for intent in intents {
                        if closed.is_cancelled() {
                            break;
                        }
                        deliver(&mut dispatch, intent, &bus, handler);
                    }
                }
            }
        }
        rx.close();
        tracing::debug!(handler, "dispatch loop stopped");
    })
}

fn deliver<I, D>(dispatch: &mut D, intent: I, bus: &Bus, handler: &'static str)
where
    D: FnMut(I) -> Result<(), OperationFailure>,
{
    bus.publish(Event::new(EventKind::IntentDispatched).with_reason(handler));

    match panic::catch_unwind(AssertUnwindSafe(|| dispatch(intent))) {
        Ok(Ok(())) => {}
        Ok(Err(failure)) => {
            tracing::warn!(handler, err = %failure, "handler failed");
            bus.publish(Event::new(EventKind::HandlerFailed).with_reason(failure.to_string()));
        }
        Err(payload) => {
            let info = panic_info(&*payload);
            tracing::error!(handler, %info, "handler panicked");
            bus.publish(Event::new(EventKind::HandlerPanicked).with_reason(info));
        }
    }
}
