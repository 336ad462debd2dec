//! Single-consumer execution queue feeding the privileged thread.
//!
//! Connection reader threads call [`QueueHandle::enqueue`], which never
//! blocks and never touches the host. The privileged thread owns the
//! [`ExecutionQueue`] through a [`DrainLoop`] and executes items one at a
//! time in enqueue order.

mod drain;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
    mpsc::{self, Receiver, Sender, TryRecvError},
};
use std::time::Instant;

use hostbridge_wire::{CommandRequest, CommandResponse};
use thiserror::Error;
use tracing::debug;

pub use self::drain::DrainLoop;

/// Tracing target for queue operations.
pub(crate) const QUEUE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::queue");

/// Identifies one accepted connection for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "session-{}", self.0)
    }
}

/// Signals the host that queued work is ready.
///
/// Hosts that pump [`DrainLoop::drain_pending`] from their own event loop
/// schedule a callback here. The call happens on an I/O thread and must not
/// block.
pub trait HostWaker: Send + Sync {
    /// Requests a drain on the privileged thread.
    fn wake(&self);
}

/// Waker for drain loops that block on the queue themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWaker;

impl HostWaker for NoopWaker {
    fn wake(&self) {}
}

/// Receives responses produced on the privileged thread.
pub trait ResponseSink: Send + Sync {
    /// Sends `response` back over the connection identified by `session`.
    fn deliver(&self, session: SessionId, response: CommandResponse);
}

impl<T> ResponseSink for Arc<T>
where
    T: ResponseSink + ?Sized,
{
    fn deliver(&self, session: SessionId, response: CommandResponse) {
        (**self).deliver(session, response);
    }
}

/// A request waiting for the privileged thread.
#[derive(Debug, Clone)]
pub struct QueuedItem {
    /// Decoded request.
    pub request: CommandRequest,
    /// Connection the request arrived on.
    pub session: SessionId,
    /// When the item entered the queue.
    pub enqueued_at: Instant,
}

/// Returned by [`QueueHandle::enqueue`] once the queue has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("execution queue is closed")]
pub struct QueueClosed;

enum Envelope {
    Item(QueuedItem),
    Stop,
}

/// Consumer side of the queue, owned by the privileged thread.
pub struct ExecutionQueue {
    receiver: Receiver<Envelope>,
    shared: Arc<Shared>,
}

/// Producer side of the queue, cloned into every connection reader.
#[derive(Clone)]
pub struct QueueHandle {
    sender: Sender<Envelope>,
    waker: Arc<dyn HostWaker>,
    shared: Arc<Shared>,
}

struct Shared {
    closed: AtomicBool,
    depth: AtomicUsize,
}

impl ExecutionQueue {
    /// Creates a queue and its producer handle.
    #[must_use]
    pub fn new(waker: Arc<dyn HostWaker>) -> (Self, QueueHandle) {
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            depth: AtomicUsize::new(0),
        });
        let queue = Self {
            receiver,
            shared: Arc::clone(&shared),
        };
        let handle = QueueHandle {
            sender,
            waker,
            shared,
        };
        (queue, handle)
    }

    /// Blocks until the next item arrives; `None` once the queue is closed.
    pub fn recv(&self) -> Option<QueuedItem> {
        if self.shared.is_closed() {
            self.discard_pending();
            return None;
        }
        match self.receiver.recv() {
            Ok(Envelope::Item(item)) => self.admit(item),
            Ok(Envelope::Stop) | Err(_) => {
                self.discard_pending();
                None
            }
        }
    }

    /// Returns the next ready item without blocking.
    pub fn try_recv(&self) -> Option<QueuedItem> {
        match self.receiver.try_recv() {
            Ok(Envelope::Item(item)) => self.admit(item),
            Ok(Envelope::Stop) => {
                self.discard_pending();
                None
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Returns `true` once [`QueueHandle::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    fn admit(&self, item: QueuedItem) -> Option<QueuedItem> {
        self.shared.depth.fetch_sub(1, Ordering::SeqCst);
        if self.shared.is_closed() {
            self.discard(&item);
            self.discard_pending();
            return None;
        }
        Some(item)
    }

    fn discard_pending(&self) {
        for envelope in self.receiver.try_iter() {
            if let Envelope::Item(item) = envelope {
                self.shared.depth.fetch_sub(1, Ordering::SeqCst);
                self.discard(&item);
            }
        }
    }

    fn discard(&self, item: &QueuedItem) {
        debug!(
            target: QUEUE_TARGET,
            request_id = %item.request.request_id,
            session = %item.session,
            "discarding queued request after close"
        );
    }
}

impl QueueHandle {
    /// Queues `request` for the privileged thread and wakes the host.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] when the queue no longer accepts work.
    pub fn enqueue(&self, request: CommandRequest, session: SessionId) -> Result<(), QueueClosed> {
        if self.shared.is_closed() {
            return Err(QueueClosed);
        }
        let item = QueuedItem {
            request,
            session,
            enqueued_at: Instant::now(),
        };
        self.shared.depth.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Envelope::Item(item)).is_err() {
            self.shared.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueClosed);
        }
        self.waker.wake();
        Ok(())
    }

    /// Stops accepting work and discards anything not yet executed.
    ///
    /// An item already running on the privileged thread finishes normally.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Receiver already gone when the drain loop exited first.
        drop(self.sender.send(Envelope::Stop));
        self.waker.wake();
    }

    /// Returns `true` once the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Number of items waiting for the privileged thread.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.shared.depth.load(Ordering::SeqCst)
    }
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
