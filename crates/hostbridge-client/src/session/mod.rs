//! Caller-side transport session.
//!
//! A [`ClientSession`] owns at most one connection to the executor. Inbound
//! frames are delivered to a [`FrameHandler`] from a dedicated reader thread.
//! When the connection drops or a handshake fails, the session moves to
//! `Disconnected` and a supervisor thread retries after a constant interval
//! until it connects or [`ClientSession::close`] is called. Sending never
//! buffers: `send` fails fast unless the session is `Connected`. Frames are
//! written outside the session lock, so a stalled executor never blocks
//! `close` or state queries.

mod clock;
mod errors;
mod schedule;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use hostbridge_config::{Config, SocketEndpoint};
use hostbridge_wire::{ConnectionState, FrameReader, FrameWriter};
use tracing::{debug, info, warn};

use crate::transport::{self, Connection};

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::errors::SessionError;
pub use self::schedule::ReconnectSchedule;

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Receives inbound frames from the session's reader thread.
pub trait FrameHandler: Send + Sync + 'static {
    /// Called once per complete frame, in arrival order.
    fn on_frame(&self, frame: &[u8]);

    /// Called when an established connection is lost.
    fn on_disconnect(&self) {}
}

/// Connection parameters for a [`ClientSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Executor endpoint.
    pub endpoint: SocketEndpoint,
    /// Budget for one handshake.
    pub handshake_timeout: Duration,
    /// Constant delay between reconnection attempts.
    pub reconnect_interval: Duration,
}

impl SessionSettings {
    /// Extracts session settings from the shared configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.bridge_socket().clone(),
            handshake_timeout: config.handshake_timeout(),
            reconnect_interval: config.reconnect_interval(),
        }
    }
}

/// One logical connection to the executor with automatic reconnects.
pub struct ClientSession {
    inner: Arc<Inner>,
}

struct Inner {
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    handler: Arc<dyn FrameHandler>,
    shared: Mutex<Shared>,
    changed: Condvar,
}

struct Shared {
    state: ConnectionState,
    link: Option<Link>,
    generation: u64,
    schedule: ReconnectSchedule,
    supervisor_running: bool,
    closed: bool,
}

/// The live connection: `control` shuts it down while `writer` may be busy.
struct Link {
    control: Connection,
    writer: Arc<Mutex<Connection>>,
}

impl ClientSession {
    /// Creates a disconnected session using the system clock.
    #[must_use]
    pub fn new(settings: SessionSettings, handler: Arc<dyn FrameHandler>) -> Self {
        Self::with_clock(settings, handler, Arc::new(SystemClock))
    }

    /// Creates a disconnected session driven by `clock`.
    #[must_use]
    pub fn with_clock(
        settings: SessionSettings,
        handler: Arc<dyn FrameHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let schedule = ReconnectSchedule::new(settings.reconnect_interval);
        Self {
            inner: Arc::new(Inner {
                settings,
                clock,
                handler,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Disconnected,
                    link: None,
                    generation: 0,
                    schedule,
                    supervisor_running: false,
                    closed: false,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Endpoint this session dials.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.inner.settings.endpoint
    }

    /// Instant of the next scheduled reconnect attempt, if any.
    #[must_use]
    pub fn next_reconnect_at(&self) -> Option<Instant> {
        self.inner.lock().schedule.next_attempt()
    }

    /// Makes one handshake attempt.
    ///
    /// Succeeds immediately when already connected. A failure schedules a
    /// background retry after the reconnect interval.
    ///
    /// # Errors
    ///
    /// Returns the connection failure, or [`SessionError::HandshakeTimeout`]
    /// when the handshake budget elapses.
    pub fn connect(&self) -> Result<(), SessionError> {
        self.inner.reopen();
        self.inner.attempt(self.inner.settings.handshake_timeout)
    }

    /// Keeps attempting to connect until connected or `timeout` elapses,
    /// pausing the reconnect interval between attempts.
    ///
    /// # Errors
    ///
    /// Returns the last connection failure when the timeout elapses, or
    /// [`SessionError::Closed`] if the session is closed meanwhile.
    pub fn connect_within(&self, timeout: Duration) -> Result<(), SessionError> {
        self.inner.reopen();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let handshake = self.inner.settings.handshake_timeout.min(remaining);
            let error = match self.inner.attempt(handshake) {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };
            if matches!(error, SessionError::Closed) {
                return Err(error);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(error);
            }
            let pause = self.inner.settings.reconnect_interval.min(remaining);
            if self.inner.wait_for_connection(pause) {
                return Ok(());
            }
        }
    }

    /// Writes one frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] unless connected. A write
    /// failure drops the connection, schedules a reconnect and returns
    /// [`SessionError::Send`].
    pub fn send(&self, frame: &[u8]) -> Result<(), SessionError> {
        let (writer, generation) = {
            let shared = self.inner.lock();
            if shared.state != ConnectionState::Connected {
                return Err(SessionError::NotConnected);
            }
            let Some(link) = shared.link.as_ref() else {
                return Err(SessionError::NotConnected);
            };
            (Arc::clone(&link.writer), shared.generation)
        };

        let written = {
            let mut connection = writer.lock().unwrap_or_else(PoisonError::into_inner);
            FrameWriter::new(&mut *connection).write_frame(frame)
        };
        let Err(error) = written else {
            return Ok(());
        };

        warn!(
            target: SESSION_TARGET,
            endpoint = %self.inner.settings.endpoint,
            error = %error,
            "send failed; dropping connection"
        );
        self.inner.connection_lost(generation);
        Err(SessionError::Send(error))
    }

    /// Closes the connection and stops reconnecting.
    pub fn close(&self) {
        let link = {
            let mut shared = self.inner.lock();
            shared.closed = true;
            shared.schedule.cancel();
            let link = shared.link.take();
            if link.is_some() {
                shared.state = ConnectionState::Closing;
            }
            link
        };
        self.inner.changed.notify_all();

        if let Some(link) = link {
            link.control.shutdown();
            info!(
                target: SESSION_TARGET,
                endpoint = %self.inner.settings.endpoint,
                "session closed"
            );
        }

        self.inner.lock().state = ConnectionState::Disconnected;
        self.inner.changed.notify_all();
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reopen(&self) {
        self.lock().closed = false;
    }

    fn attempt(self: &Arc<Self>, handshake: Duration) -> Result<(), SessionError> {
        {
            let mut shared = self.lock();
            if shared.closed {
                return Err(SessionError::Closed);
            }
            let state = shared.state;
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => {
                    // Another thread is mid-handshake; wait for its outcome.
                    let (guard, _) = self
                        .changed
                        .wait_timeout_while(shared, handshake, |shared| {
                            shared.state == ConnectionState::Connecting && !shared.closed
                        })
                        .unwrap_or_else(PoisonError::into_inner);
                    return match guard.state {
                        ConnectionState::Connected => Ok(()),
                        _ if guard.closed => Err(SessionError::Closed),
                        _ => Err(SessionError::NotConnected),
                    };
                }
                ConnectionState::Disconnected | ConnectionState::Closing => {}
            }
            shared.state = ConnectionState::Connecting;
            shared.schedule.cancel();
        }
        self.changed.notify_all();

        debug!(
            target: SESSION_TARGET,
            endpoint = %self.settings.endpoint,
            "connecting"
        );
        let result = transport::connect(&self.settings.endpoint, handshake).and_then(|control| {
            let reader = control.try_clone().map_err(SessionError::Split)?;
            let writer = control.try_clone().map_err(SessionError::Split)?;
            let link = Link {
                control,
                writer: Arc::new(Mutex::new(writer)),
            };
            Ok((link, reader))
        });

        let mut shared = self.lock();
        match result {
            Ok((link, reader)) => {
                if shared.closed {
                    shared.state = ConnectionState::Disconnected;
                    drop(shared);
                    link.control.shutdown();
                    self.changed.notify_all();
                    return Err(SessionError::Closed);
                }
                shared.generation = shared.generation.wrapping_add(1);
                let generation = shared.generation;
                shared.link = Some(link);
                shared.state = ConnectionState::Connected;
                shared.schedule.record_success();
                drop(shared);
                self.changed.notify_all();

                info!(
                    target: SESSION_TARGET,
                    endpoint = %self.settings.endpoint,
                    "session connected"
                );
                self.spawn_reader(reader, generation);
                Ok(())
            }
            Err(error) => {
                shared.state = ConnectionState::Disconnected;
                if !shared.closed {
                    let now = self.clock.now();
                    shared.schedule.record_failure(now);
                    self.ensure_supervisor(&mut shared);
                }
                drop(shared);
                self.changed.notify_all();

                warn!(
                    target: SESSION_TARGET,
                    endpoint = %self.settings.endpoint,
                    error = %error,
                    "connection attempt failed"
                );
                Err(error)
            }
        }
    }

    fn wait_for_connection(&self, timeout: Duration) -> bool {
        let shared = self.lock();
        let (shared, _) = self
            .changed
            .wait_timeout_while(shared, timeout, |shared| {
                shared.state != ConnectionState::Connected && !shared.closed
            })
            .unwrap_or_else(PoisonError::into_inner);
        shared.state == ConnectionState::Connected
    }

    fn ensure_supervisor(self: &Arc<Self>, shared: &mut Shared) {
        if shared.supervisor_running {
            return;
        }
        let inner = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("hostbridge-reconnect".to_owned())
            .spawn(move || inner.supervise());
        match spawned {
            Ok(_) => shared.supervisor_running = true,
            Err(error) => warn!(
                target: SESSION_TARGET,
                error = %error,
                "failed to spawn reconnect supervisor"
            ),
        }
    }

    fn supervise(self: Arc<Self>) {
        loop {
            let mut shared = self.lock();
            if shared.closed || shared.state == ConnectionState::Connected {
                shared.supervisor_running = false;
                return;
            }
            if shared.state == ConnectionState::Connecting {
                let interval = self.settings.reconnect_interval;
                drop(self.changed.wait_timeout(shared, interval));
                continue;
            }
            match shared.schedule.remaining(self.clock.now()) {
                None => {
                    shared.supervisor_running = false;
                    return;
                }
                Some(wait) if !wait.is_zero() => {
                    drop(self.changed.wait_timeout(shared, wait));
                    continue;
                }
                Some(_) => {}
            }
            drop(shared);

            debug!(
                target: SESSION_TARGET,
                endpoint = %self.settings.endpoint,
                "reconnect attempt due"
            );
            // Failures reschedule themselves; the loop picks the new deadline up.
            drop(self.attempt(self.settings.handshake_timeout));
        }
    }

    fn spawn_reader(self: &Arc<Self>, reader: Connection, generation: u64) {
        let inner = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("hostbridge-session-reader".to_owned())
            .spawn(move || inner.read_frames(reader, generation));
        if let Err(error) = spawned {
            warn!(
                target: SESSION_TARGET,
                error = %error,
                "failed to spawn session reader"
            );
            self.connection_lost(generation);
        }
    }

    fn read_frames(self: Arc<Self>, reader: Connection, generation: u64) {
        let mut frames = FrameReader::new(reader);
        loop {
            match frames.read_frame() {
                Ok(Some(frame)) => self.handler.on_frame(&frame),
                Ok(None) => {
                    debug!(
                        target: SESSION_TARGET,
                        endpoint = %self.settings.endpoint,
                        "peer closed the connection"
                    );
                    break;
                }
                Err(error) => {
                    debug!(
                        target: SESSION_TARGET,
                        endpoint = %self.settings.endpoint,
                        error = %error,
                        "session read ended"
                    );
                    break;
                }
            }
        }
        self.connection_lost(generation);
    }

    /// Tears down the connection identified by `generation` if it is still
    /// current, then schedules a reconnect.
    fn connection_lost(self: &Arc<Self>, generation: u64) {
        let mut shared = self.lock();
        if shared.generation != generation || shared.state != ConnectionState::Connected {
            return;
        }
        if let Some(link) = shared.link.take() {
            link.control.shutdown();
        }
        shared.state = ConnectionState::Disconnected;
        if !shared.closed {
            let now = self.clock.now();
            shared.schedule.record_failure(now);
            self.ensure_supervisor(&mut shared);
        }
        drop(shared);
        self.changed.notify_all();

        info!(
            target: SESSION_TARGET,
            endpoint = %self.settings.endpoint,
            "session disconnected"
        );
        self.handler.on_disconnect();
    }
}
