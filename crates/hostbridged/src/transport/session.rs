//! Holder of the single authoritative peer connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hostbridge_wire::{
    CommandResponse, ConnectionState, FrameReader, FrameWriter, decode_request,
    salvage_request_id,
};
use tracing::{debug, info, warn};

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET};
use crate::dispatch::DispatchError;
use crate::queue::{QueueHandle, ResponseSink, SessionId};

/// Executor-side session: at most one connected peer at a time.
///
/// Attaching a new connection shuts down the previous one. Responses for a
/// replaced connection are dropped rather than written to the new peer.
/// Responses are written outside the slot lock, so a peer that stops reading
/// only stalls its own writer; a failed write drops that connection.
pub(crate) struct SessionSlot {
    state: Mutex<SlotState>,
    next_id: AtomicU64,
    queue: QueueHandle,
}

#[derive(Default)]
struct SlotState {
    active: Option<ActiveSession>,
    closing: bool,
}

struct ActiveSession {
    id: SessionId,
    peer: String,
    control: ConnectionStream,
    writer: SharedWriter,
}

type SharedWriter = Arc<Mutex<FrameWriter<ConnectionStream>>>;

impl SessionSlot {
    pub(crate) fn new(queue: QueueHandle) -> Self {
        Self {
            state: Mutex::new(SlotState::default()),
            next_id: AtomicU64::new(1),
            queue,
        }
    }

    /// Installs `stream` as the active connection and returns its reading half.
    fn attach(&self, stream: ConnectionStream) -> Option<(SessionId, ConnectionStream)> {
        let peer = stream.peer_label();
        let halves = stream
            .try_clone()
            .and_then(|reader| stream.try_clone().map(|writer| (reader, writer)));
        let (reader, writer) = match halves {
            Ok(halves) => halves,
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    peer = %peer,
                    error = %error,
                    "failed to clone connection stream"
                );
                stream.shutdown();
                return None;
            }
        };

        let mut state = self.lock();
        if state.closing {
            debug!(target: LISTENER_TARGET, peer = %peer, "rejecting connection while closing");
            stream.shutdown();
            return None;
        }
        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let previous = state.active.replace(ActiveSession {
            id,
            peer: peer.clone(),
            control: stream,
            writer: Arc::new(Mutex::new(FrameWriter::new(writer))),
        });
        drop(state);

        if let Some(previous) = previous {
            info!(
                target: LISTENER_TARGET,
                replaced = %previous.id,
                session = %id,
                "replacing active connection"
            );
            previous.control.shutdown();
        }
        info!(target: LISTENER_TARGET, session = %id, peer = %peer, "peer connected");
        Some((id, reader))
    }

    fn detach(&self, id: SessionId) {
        let detached = {
            let mut state = self.lock();
            if state.active.as_ref().map(|active| active.id) == Some(id) {
                state.active.take()
            } else {
                None
            }
        };
        if let Some(active) = detached {
            active.control.shutdown();
            info!(
                target: LISTENER_TARGET,
                session = %id,
                peer = %active.peer,
                "peer disconnected"
            );
        }
    }

    fn read_loop(&self, id: SessionId, stream: ConnectionStream) {
        let mut reader = FrameReader::new(stream);
        loop {
            match reader.read_frame() {
                Ok(Some(frame)) => self.accept_frame(id, &frame),
                Ok(None) => {
                    debug!(target: LISTENER_TARGET, session = %id, "peer closed the stream");
                    break;
                }
                Err(error) if error.is_recoverable() => {
                    warn!(
                        target: LISTENER_TARGET,
                        session = %id,
                        error = %error,
                        "skipping unreadable frame"
                    );
                }
                Err(error) => {
                    debug!(
                        target: LISTENER_TARGET,
                        session = %id,
                        error = %error,
                        "connection read ended"
                    );
                    break;
                }
            }
        }
    }

    fn accept_frame(&self, id: SessionId, frame: &[u8]) {
        match decode_request(frame) {
            Ok(request) => {
                let request_id = request.request_id.clone();
                if self.queue.enqueue(request, id).is_err() {
                    let error = DispatchError::ShuttingDown;
                    self.deliver(id, CommandResponse::failure(request_id, error.to_string()));
                }
            }
            Err(error) => {
                if let Some(request_id) = salvage_request_id(frame) {
                    let failure = DispatchError::invalid_structure(error.to_string());
                    self.deliver(id, CommandResponse::failure(request_id, failure.to_string()));
                } else {
                    warn!(
                        target: LISTENER_TARGET,
                        session = %id,
                        error = %error,
                        "skipping undecodable frame"
                    );
                }
            }
        }
    }

    /// Observable connection state of the executor side.
    pub(crate) fn state(&self) -> ConnectionState {
        let state = self.lock();
        if state.closing {
            ConnectionState::Closing
        } else if state.active.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub(crate) fn is_peer_connected(&self) -> bool {
        self.lock().active.is_some()
    }

    /// Refuses further connections and drops the active one.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        state.closing = true;
        let active = state.active.take();
        drop(state);
        if let Some(active) = active {
            active.control.shutdown();
            info!(target: LISTENER_TARGET, session = %active.id, "session closed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConnectionHandler for SessionSlot {
    fn handle(&self, stream: ConnectionStream) {
        let Some((id, reader)) = self.attach(stream) else {
            return;
        };
        self.read_loop(id, reader);
        self.detach(id);
    }
}

impl ResponseSink for SessionSlot {
    fn deliver(&self, session: SessionId, response: CommandResponse) {
        let writer = self
            .lock()
            .active
            .as_ref()
            .filter(|active| active.id == session)
            .map(|active| Arc::clone(&active.writer));
        let Some(writer) = writer else {
            debug!(
                target: LISTENER_TARGET,
                session = %session,
                request_id = %response.request_id,
                "dropping response for a closed connection"
            );
            return;
        };

        let written = writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_response(&response);
        if let Err(error) = written {
            warn!(
                target: LISTENER_TARGET,
                session = %session,
                request_id = %response.request_id,
                error = %error,
                "failed to write response; dropping connection"
            );
            self.detach(session);
        }
    }
}
