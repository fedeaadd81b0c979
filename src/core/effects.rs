//! # EffectChannel: bounded, drop-oldest delivery of one-shot effects.
//!
//! Producers call [`EffectChannel::send`] from any task; consumers drain through an
//! [`EffectReceiver`]. Each effect is delivered to at most one receiver, at most once.
//!
//! ## Architecture
//! ```text
//! send(e) ──► lock ──► [VecDeque; capacity] ──► unlock ──► notify_one
//!                        │ full? pop_front (evict oldest) + EffectDropped
//!
//! recv()  ──► lock ──► pop_front? ─► Some(e)
//!                        closed & empty? ─► None
//!                        otherwise wait for notify
//! ```
//!
//! ## Rules
//! - `send` never blocks and never drops the newest effect
//! - overflow evicts the **oldest buffered** effect
//! - order is send-completion order
//! - `close()` is idempotent; receivers drain what remains, then end

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::EngineError;
use crate::events::{Bus, Event, EventKind};

struct Buffer<E> {
    items: VecDeque<E>,
    closed: bool,
}

struct Shared<E> {
    buffer: Mutex<Buffer<E>>,
    notify: Notify,
    capacity: usize,
    bus: Bus,
}

/// Producer side of the effect channel. Cheap to clone.
pub struct EffectChannel<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for EffectChannel<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Send + 'static> EffectChannel<E> {
    /// Creates a channel holding at most `capacity` undrained effects (min 1).
    pub fn new(capacity: usize, bus: Bus) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(Buffer {
                    items: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                notify: Notify::new(),
                capacity,
                bus,
            }),
        }
    }

    /// Enqueues an effect, evicting the oldest buffered one if the channel is full.
    ///
    /// Fails with [`EngineError::ChannelClosed`] after [`close`](Self::close).
    pub fn send(&self, effect: E) -> Result<(), EngineError> {
        let evicted = {
            let mut buf = self.shared.buffer.lock();
            if buf.closed {
                return Err(EngineError::ChannelClosed { channel: "effect" });
            }
            let evicted = if buf.items.len() >= self.shared.capacity {
                buf.items.pop_front()
            } else {
                None
            };
            buf.items.push_back(effect);
            evicted
        };
        self.shared.notify.notify_one();

        if evicted.is_some() {
            self.shared.bus.publish(
                Event::new(EventKind::EffectDropped)
                    .with_reason(format!("capacity={}", self.shared.capacity)),
            );
        }
        Ok(())
    }

    /// Closes the channel. Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let was_open = {
            let mut buf = self.shared.buffer.lock();
            !std::mem::replace(&mut buf.closed, true)
        };
        if was_open {
            self.shared.notify.notify_waiters();
        }
        was_open
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.buffer.lock().closed
    }

    /// Number of buffered, undrained effects.
    pub fn len(&self) -> usize {
        self.shared.buffer.lock().items.len()
    }

    /// True if no effect is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a consumer handle.
    ///
    /// Several receivers may exist; each effect goes to exactly one of them.
    pub fn receiver(&self) -> EffectReceiver<E> {
        EffectReceiver {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Consumer side of the effect channel.
pub struct EffectReceiver<E> {
    shared: Arc<Shared<E>>,
}

impl<E: Send + 'static> EffectReceiver<E> {
    /// Waits for the next effect.
    ///
    /// Returns `None` once the channel is closed and fully drained.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            // Register interest before checking, so a send or close racing with
            // the check still wakes us.
            let notified = self.shared.notify.notified();
            {
                let mut buf = self.shared.buffer.lock();
                if let Some(effect) = buf.items.pop_front() {
                    return Some(effect);
                }
                if buf.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Takes the next effect if one is buffered.
    pub fn try_recv(&mut self) -> Option<E> {
        self.shared.buffer.lock().items.pop_front()
    }

    /// Converts the receiver into a lazy stream that ends after close + drain.
    pub fn into_stream(self) -> BoxStream<'static, E> {
        stream::unfold(self, |mut rx| async move {
            let effect = rx.recv().await?;
            Some((effect, rx))
        })
        .boxed()
    }
}
