//! Privileged-thread drain loop.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use hostbridge_wire::CommandResponse;
use tracing::{debug, info, warn};

use super::{ExecutionQueue, QUEUE_TARGET, QueuedItem, ResponseSink};
use crate::dispatch::{DispatchError, Dispatcher, Transactional};

/// Owns the host and executes queued requests one at a time.
pub struct DrainLoop<H> {
    queue: ExecutionQueue,
    dispatcher: Dispatcher<H>,
    host: H,
    sink: Arc<dyn ResponseSink>,
}

impl<H: Transactional> DrainLoop<H> {
    /// Assembles a drain loop; nothing runs until [`DrainLoop::run`] or
    /// [`DrainLoop::drain_pending`] is called.
    #[must_use]
    pub fn new(
        queue: ExecutionQueue,
        dispatcher: Dispatcher<H>,
        host: H,
        sink: Arc<dyn ResponseSink>,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            host,
            sink,
        }
    }

    /// Executes items until the queue is closed, then hands the host back.
    pub fn run(mut self) -> H {
        info!(target: QUEUE_TARGET, "drain loop started");
        while let Some(item) = self.queue.recv() {
            self.execute(item);
        }
        info!(target: QUEUE_TARGET, "drain loop stopped");
        self.host
    }

    /// Executes every item that is ready now and returns how many ran.
    pub fn drain_pending(&mut self) -> usize {
        let mut executed = 0;
        while let Some(item) = self.queue.try_recv() {
            self.execute(item);
            executed += 1;
        }
        executed
    }

    /// Borrows the host between drains.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Consumes the loop, returning the host.
    pub fn into_host(self) -> H {
        self.host
    }

    fn execute(&mut self, item: QueuedItem) {
        let QueuedItem {
            request,
            session,
            enqueued_at,
        } = item;
        debug!(
            target: QUEUE_TARGET,
            request_id = %request.request_id,
            session = %session,
            queued_ms = enqueued_at.elapsed().as_millis(),
            "executing queued request"
        );

        let dispatcher = &self.dispatcher;
        let host = &mut self.host;
        let response = match catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(host, &request)))
        {
            Ok(response) => response,
            Err(payload) => {
                let error = DispatchError::panicked(panic_message(payload.as_ref()));
                warn!(
                    target: QUEUE_TARGET,
                    request_id = %request.request_id,
                    command = request.command(),
                    error = %error,
                    "command panicked"
                );
                CommandResponse::failure(request.request_id.clone(), error.to_string())
            }
        };
        self.sink.deliver(session, response);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
