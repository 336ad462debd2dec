//! Correlation of outstanding calls with their responses.
//!
//! Each call registers a pending entry keyed by a fresh [`RequestId`] and
//! receives the matching [`CommandResponse`] through a one-shot channel. An
//! entry disappears when its response arrives, when the caller gives up, or
//! when [`RequestRegistry::expire`] sweeps it past its deadline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use hostbridge_wire::{CommandResponse, RequestId};
use tracing::debug;

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

static REGISTRY_INSTANCES: AtomicU64 = AtomicU64::new(0);

struct PendingCall {
    deadline: Instant,
    reply: Sender<CommandResponse>,
}

/// Table of calls awaiting a response.
pub struct RequestRegistry {
    nonce: String,
    counter: AtomicU64,
    pending: Mutex<HashMap<RequestId, PendingCall>>,
    unmatched: AtomicU64,
}

impl RequestRegistry {
    /// Creates an empty registry with a process-unique id prefix.
    #[must_use]
    pub fn new() -> Self {
        let instance = REGISTRY_INSTANCES.fetch_add(1, Ordering::Relaxed);
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.subsec_nanos())
            .unwrap_or_default();
        Self {
            nonce: format!("{:x}{started:x}{instance:x}", std::process::id()),
            counter: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            unmatched: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, PendingCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates the next request id without registering it.
    #[must_use]
    pub fn next_request_id(&self) -> RequestId {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        RequestId::new(format!("req-{}-{sequence}", self.nonce))
    }

    /// Registers a pending call due at `deadline`.
    ///
    /// The receiver yields the matching response. It reports disconnection
    /// when the entry is cancelled or expired.
    #[must_use]
    pub fn register(&self, deadline: Instant) -> (RequestId, Receiver<CommandResponse>) {
        let (reply, receiver) = mpsc::channel();
        let id = self.next_request_id();
        self.lock()
            .insert(id.clone(), PendingCall { deadline, reply });
        (id, receiver)
    }

    /// Delivers a response to its pending call.
    ///
    /// Returns `false` for responses that match nothing outstanding; those
    /// are discarded and counted.
    pub fn resolve(&self, response: CommandResponse) -> bool {
        let entry = self.lock().remove(&response.request_id);
        let Some(call) = entry else {
            let total = self.unmatched.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                target: REGISTRY_TARGET,
                request_id = %response.request_id,
                unmatched_total = total,
                "discarding unmatched response"
            );
            return false;
        };
        let request_id = response.request_id.clone();
        if call.reply.send(response).is_err() {
            debug!(
                target: REGISTRY_TARGET,
                request_id = %request_id,
                "caller stopped waiting before delivery"
            );
        }
        true
    }

    /// Removes a pending call. Returns `true` if it was still outstanding.
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        self.lock().remove(request_id).is_some()
    }

    /// Removes every call whose deadline is at or before `now`.
    pub fn expire(&self, now: Instant) -> Vec<RequestId> {
        let mut pending = self.lock();
        let expired: Vec<RequestId> = pending
            .iter()
            .filter(|(_, call)| call.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            pending.remove(id);
        }
        drop(pending);
        if !expired.is_empty() {
            debug!(
                target: REGISTRY_TARGET,
                expired = expired.len(),
                "expired overdue calls"
            );
        }
        expired
    }

    /// Returns `true` while a call with `request_id` is outstanding.
    #[must_use]
    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.lock().contains_key(request_id)
    }

    /// Number of outstanding calls.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Number of responses discarded because nothing matched them.
    #[must_use]
    pub fn unmatched_count(&self) -> u64 {
        self.unmatched.load(Ordering::Relaxed)
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}
