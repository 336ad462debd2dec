//! Bridge service lifecycle.
//!
//! [`BridgeService`] wires the socket listener, the session slot, the
//! execution queue and the dispatcher around one host value. Starting the
//! service moves the host onto a dedicated privileged thread; stopping it
//! joins that thread and takes the host back, so the service can be started
//! again with the same state.

mod enablement;
mod errors;


use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread::{self, JoinHandle};

use hostbridge_config::{Config, SocketEndpoint};
use hostbridge_wire::ConnectionState;
use tracing::{debug, info, warn};

pub use self::enablement::{
    EnablementError, EnablementStore, FileEnablementStore, MemoryEnablementStore,
};
pub use self::errors::ServiceError;

use crate::dispatch::{Dispatcher, Transactional};
use crate::health::HealthReporter;
use crate::queue::{DrainLoop, ExecutionQueue, NoopWaker, QueueHandle, ResponseSink};
use crate::transport::{ConnectionHandler, ListenerHandle, SessionSlot, SocketListener};

const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Observable lifecycle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    /// Not listening; the host is idle.
    Stopped,
    /// Binding the listener and spawning the privileged thread.
    Starting,
    /// Accepting a peer and executing commands.
    Running,
    /// Closing the session and joining the privileged thread.
    Stopping,
}

impl ServiceState {
    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Executor service owning one host value.
pub struct BridgeService<H> {
    dispatcher: Dispatcher<H>,
    store: Arc<dyn EnablementStore>,
    reporter: Arc<dyn HealthReporter>,
    lifecycle: Mutex<Lifecycle<H>>,
    observed: Mutex<Observed>,
}

struct Lifecycle<H> {
    host: Option<H>,
    running: Option<Running<H>>,
}

struct Running<H> {
    slot: Arc<SessionSlot>,
    queue: QueueHandle,
    listener: ListenerHandle,
    worker: JoinHandle<Option<H>>,
}

struct Observed {
    state: ServiceState,
    slot: Option<Arc<SessionSlot>>,
    endpoint: Option<SocketEndpoint>,
}

impl<H> BridgeService<H>
where
    H: Transactional + Send + 'static,
{
    /// Creates a stopped service.
    pub fn new(
        host: H,
        dispatcher: Dispatcher<H>,
        store: Arc<dyn EnablementStore>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            reporter,
            lifecycle: Mutex::new(Lifecycle {
                host: Some(host),
                running: None,
            }),
            observed: Mutex::new(Observed {
                state: ServiceState::Stopped,
                slot: None,
                endpoint: None,
            }),
        }
    }

    /// Starts listening on the configured endpoint.
    ///
    /// Starting a running service does nothing and reports
    /// [`ServiceState::Running`]. On failure the service returns to
    /// [`ServiceState::Stopped`] and keeps its host.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket cannot be prepared or bound, or when
    /// the privileged thread cannot be spawned.
    pub fn start(&self, config: &Config) -> Result<ServiceState, ServiceError> {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.running.is_some() {
            debug!(target: SERVICE_TARGET, "start requested while running");
            return Ok(ServiceState::Running);
        }

        self.transition(ServiceState::Starting);
        match self.launch(&mut lifecycle, config) {
            Ok(running) => {
                let slot = Arc::clone(&running.slot);
                lifecycle.running = Some(running);
                drop(lifecycle);
                self.persist(true);
                {
                    let mut observed = lock(&self.observed);
                    observed.slot = Some(slot);
                }
                self.transition(ServiceState::Running);
                Ok(ServiceState::Running)
            }
            Err(error) => {
                drop(lifecycle);
                self.reporter.service_failed(&error);
                lock(&self.observed).endpoint = None;
                self.transition(ServiceState::Stopped);
                Err(error)
            }
        }
    }

    /// Stops the service and recovers the host.
    ///
    /// Queued requests that have not started are discarded. Stopping a
    /// stopped service does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PrivilegedThreadPanicked`] when the host could
    /// not be recovered; the service is stopped regardless.
    pub fn stop(&self) -> Result<ServiceState, ServiceError> {
        let mut lifecycle = lock(&self.lifecycle);
        let Some(running) = lifecycle.running.take() else {
            debug!(target: SERVICE_TARGET, "stop requested while stopped");
            return Ok(ServiceState::Stopped);
        };

        self.transition(ServiceState::Stopping);
        let Running {
            slot,
            queue,
            listener,
            worker,
        } = running;
        listener.shutdown();
        slot.close();
        queue.close();
        if let Err(error) = listener.join() {
            warn!(target: SERVICE_TARGET, error = %error, "listener thread failed");
        }
        let joined = worker.join();
        let result = match joined {
            Ok(Some(host)) => {
                lifecycle.host = Some(host);
                Ok(ServiceState::Stopped)
            }
            Ok(None) | Err(_) => Err(ServiceError::PrivilegedThreadPanicked),
        };
        drop(lifecycle);

        self.persist(false);
        {
            let mut observed = lock(&self.observed);
            observed.slot = None;
            observed.endpoint = None;
        }
        if let Err(error) = &result {
            self.reporter.service_failed(error);
        }
        self.transition(ServiceState::Stopped);
        result
    }

    /// Starts the service only if it was enabled when last persisted.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Enablement`] when the persisted state cannot be
    /// read, or any error from [`BridgeService::start`].
    pub fn resume(&self, config: &Config) -> Result<ServiceState, ServiceError> {
        let enabled = self
            .store
            .load()
            .map_err(|source| ServiceError::Enablement { source })?;
        if enabled {
            info!(target: SERVICE_TARGET, "resuming previously enabled service");
            self.start(config)
        } else {
            debug!(target: SERVICE_TARGET, "service was disabled; not resuming");
            Ok(self.state())
        }
    }

    /// Current lifecycle position.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        lock(&self.observed).state
    }

    /// Returns `true` while a peer connection is attached.
    #[must_use]
    pub fn is_peer_connected(&self) -> bool {
        lock(&self.observed)
            .slot
            .as_ref()
            .is_some_and(|slot| slot.is_peer_connected())
    }

    /// Connection state of the executor-side session.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.observed)
            .slot
            .as_ref()
            .map_or(ConnectionState::Disconnected, |slot| slot.state())
    }

    /// Endpoint bound while running, with ephemeral TCP ports resolved.
    #[must_use]
    pub fn local_endpoint(&self) -> Option<SocketEndpoint> {
        lock(&self.observed).endpoint.clone()
    }

    /// Runs `inspect` against the host while the service is stopped.
    ///
    /// Returns `None` while running, since the host then belongs to the
    /// privileged thread.
    pub fn with_host<R>(&self, inspect: impl FnOnce(&H) -> R) -> Option<R> {
        let lifecycle = lock(&self.lifecycle);
        if lifecycle.running.is_some() {
            return None;
        }
        lifecycle.host.as_ref().map(inspect)
    }

    fn launch(
        &self,
        lifecycle: &mut Lifecycle<H>,
        config: &Config,
    ) -> Result<Running<H>, ServiceError> {
        let endpoint = config.bridge_socket();
        endpoint
            .prepare_filesystem()
            .map_err(|source| ServiceError::Socket { source })?;
        let listener =
            SocketListener::bind(endpoint).map_err(|source| ServiceError::Listener { source })?;
        let host = lifecycle.host.take().ok_or(ServiceError::HostUnavailable)?;

        let (queue, handle) = ExecutionQueue::new(Arc::new(NoopWaker));
        let slot = Arc::new(SessionSlot::new(handle.clone()));
        let sink: Arc<dyn ResponseSink> = Arc::clone(&slot) as Arc<dyn ResponseSink>;
        let drain = DrainLoop::new(queue, self.dispatcher.clone(), host, sink);
        let spawned = spawn_privileged(
            |job| {
                thread::Builder::new()
                    .name("hostbridged-privileged".to_owned())
                    .spawn(job)
            },
            drain,
        );
        let worker = match spawned {
            Ok(worker) => worker,
            Err((source, drain)) => {
                lifecycle.host = Some(drain.into_host());
                return Err(ServiceError::PrivilegedThread { source });
            }
        };

        let bound = listener.local_endpoint();
        let connections: Arc<dyn ConnectionHandler> =
            Arc::clone(&slot) as Arc<dyn ConnectionHandler>;
        let listener = match listener.start(connections) {
            Ok(listener) => listener,
            Err(source) => {
                handle.close();
                match worker.join() {
                    Ok(Some(host)) => lifecycle.host = Some(host),
                    Ok(None) | Err(_) => {
                        warn!(target: SERVICE_TARGET, "privileged thread panicked");
                    }
                }
                return Err(ServiceError::Listener { source });
            }
        };

        self.reporter.service_listening(&bound);
        lock(&self.observed).endpoint = Some(bound);
        Ok(Running {
            slot,
            queue: handle,
            listener,
            worker,
        })
    }

    fn transition(&self, next: ServiceState) {
        let previous = {
            let mut observed = lock(&self.observed);
            std::mem::replace(&mut observed.state, next)
        };
        if previous != next {
            self.reporter.service_state_changed(previous, next);
        }
    }

    fn persist(&self, enabled: bool) {
        if let Err(error) = self.store.save(enabled) {
            warn!(
                target: SERVICE_TARGET,
                enabled,
                error = %error,
                "failed to persist service state"
            );
        }
    }
}

impl<H> Drop for BridgeService<H> {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = lifecycle.running.take() {
            running.listener.shutdown();
            running.slot.close();
            running.queue.close();
            // Host value is discarded with the service.
            drop(running.worker.join());
        }
    }
}

/// Body of the privileged thread, returning the host when it finishes.
pub(crate) type PrivilegedJob<H> = Box<dyn FnOnce() -> Option<H> + Send>;

/// Starts the privileged thread through `spawn`, then hands it `drain`.
///
/// The drain loop moves only once the thread exists, so a failed spawn
/// returns it, host included, to the caller.
pub(crate) fn spawn_privileged<H, S>(
    spawn: S,
    drain: DrainLoop<H>,
) -> Result<JoinHandle<Option<H>>, (io::Error, DrainLoop<H>)>
where
    H: Transactional + Send + 'static,
    S: FnOnce(PrivilegedJob<H>) -> io::Result<JoinHandle<Option<H>>>,
{
    let (handoff, receiver) = mpsc::channel::<DrainLoop<H>>();
    let job: PrivilegedJob<H> = Box::new(move || receiver.recv().ok().map(DrainLoop::run));
    let worker = match spawn(job) {
        Ok(worker) => worker,
        Err(source) => return Err((source, drain)),
    };
    match handoff.send(drain) {
        Ok(()) => Ok(worker),
        Err(mpsc::SendError(drain)) => Err((
            io::Error::other("privileged thread exited before receiving the host"),
            drain,
        )),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
