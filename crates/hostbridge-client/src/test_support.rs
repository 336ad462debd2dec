//! In-process stand-in for the executor used by unit and behaviour tests.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use hostbridge_config::SocketEndpoint;
use hostbridge_wire::{CommandRequest, CommandResponse, FrameReader, FrameWriter, decode_request};
use serde_json::json;

/// What the fake executor does with one request.
pub(crate) enum Reply {
    Respond(CommandResponse),
    Silent,
    Hangup,
}

type Responder = dyn Fn(&CommandRequest) -> Reply + Send + Sync;

pub(crate) struct FakeExecutor {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CommandRequest>>>,
    connections: Arc<AtomicUsize>,
    streams: Arc<Mutex<Vec<TcpStream>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeExecutor {
    pub(crate) fn spawn<F>(responder: F) -> Self
    where
        F: Fn(&CommandRequest) -> Reply + Send + Sync + 'static,
    {
        Self::spawn_on(0, responder)
    }

    pub(crate) fn spawn_on<F>(port: u16, responder: F) -> Self
    where
        F: Fn(&CommandRequest) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", port)).expect("bind fake executor");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let streams = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let responder: Arc<Responder> = Arc::new(responder);

        let handle = {
            let requests = Arc::clone(&requests);
            let connections = Arc::clone(&connections);
            let streams = Arc::clone(&streams);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            stream.set_nonblocking(false).expect("blocking stream");
                            connections.fetch_add(1, Ordering::SeqCst);
                            streams
                                .lock()
                                .expect("streams lock")
                                .push(stream.try_clone().expect("clone stream"));
                            let requests = Arc::clone(&requests);
                            let responder = Arc::clone(&responder);
                            thread::spawn(move || serve(stream, &requests, responder.as_ref()));
                        }
                        Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                            thread::sleep(Duration::from_millis(5));
                        }
                        Err(_) => break,
                    }
                }
            })
        };

        Self {
            addr,
            requests,
            connections,
            streams,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Answers every request with its own name and parameters.
    pub(crate) fn echo() -> Self {
        Self::spawn(|request| {
            Reply::Respond(CommandResponse::success(
                request.request_id.clone(),
                json!({
                    "Command": request.command_name,
                    "Parameters": request.parameters,
                }),
            ))
        })
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    pub(crate) fn endpoint(&self) -> SocketEndpoint {
        SocketEndpoint::tcp("127.0.0.1", self.addr.port())
    }

    pub(crate) fn requests(&self) -> Vec<CommandRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Drops every open connection while continuing to accept new ones.
    pub(crate) fn disconnect_all(&self) {
        for stream in self.streams.lock().expect("streams lock").drain(..) {
            drop(stream.shutdown(Shutdown::Both));
        }
    }

    /// Stops accepting and drops every open connection.
    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            drop(handle.join());
        }
        self.disconnect_all();
    }
}

impl Drop for FakeExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(stream: TcpStream, requests: &Mutex<Vec<CommandRequest>>, responder: &Responder) {
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut frames = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(stream);
    while let Ok(Some(frame)) = frames.read_frame() {
        let Ok(request) = decode_request(&frame) else {
            continue;
        };
        requests.lock().expect("requests lock").push(request.clone());
        match responder(&request) {
            Reply::Respond(response) => {
                if writer.write_response(&response).is_err() {
                    return;
                }
            }
            Reply::Silent => {}
            Reply::Hangup => {
                drop(writer.get_ref().shutdown(Shutdown::Both));
                return;
            }
        }
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub(crate) fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
