//! Socket connections to the executor.
//!
//! TCP and Unix streams are wrapped in one [`Connection`] type so the session
//! logic stays transport agnostic. Both connect paths honour a handshake
//! timeout.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use hostbridge_config::SocketEndpoint;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

use crate::session::SessionError;

/// Bound on one blocked frame write to an executor that stopped reading.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// An established stream to the executor.
#[derive(Debug)]
pub(crate) enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection {
    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }

    /// Closes both directions, unblocking any thread reading the stream.
    pub(crate) fn shutdown(&self) {
        let result = match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        // The peer may already have gone away.
        drop(result);
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Opens a connection, failing when the handshake exceeds `timeout`.
pub(crate) fn connect(
    endpoint: &SocketEndpoint,
    timeout: Duration,
) -> Result<Connection, SessionError> {
    let timeout = timeout.max(Duration::from_millis(1));
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address =
                resolve_tcp_address(host, *port).map_err(|source| SessionError::Resolve {
                    endpoint: endpoint.to_string(),
                    source,
                })?;

            let stream = TcpStream::connect_timeout(&address, timeout)
                .map_err(|source| connect_error(endpoint, timeout, source))?;
            // Frames are small and latency sensitive.
            stream
                .set_nodelay(true)
                .and_then(|()| stream.set_write_timeout(Some(WRITE_TIMEOUT)))
                .map_err(|source| connect_error(endpoint, timeout, source))?;
            Ok(Connection::Tcp(stream))
        }
        SocketEndpoint::Unix { path } => {
            #[cfg(unix)]
            {
                connect_unix(path.as_str(), timeout)
                    .map_err(|source| connect_error(endpoint, timeout, source))
            }

            #[cfg(not(unix))]
            {
                let _ = path;
                Err(SessionError::UnsupportedUnixTransport(endpoint.to_string()))
            }
        }
    }
}

fn connect_error(endpoint: &SocketEndpoint, timeout: Duration, source: io::Error) -> SessionError {
    if source.kind() == io::ErrorKind::TimedOut {
        SessionError::HandshakeTimeout {
            endpoint: endpoint.to_string(),
            timeout,
        }
    } else {
        SessionError::Connect {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

#[cfg(unix)]
fn connect_unix(path: &str, timeout: Duration) -> io::Result<Connection> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, timeout)?;
    let stream: UnixStream = socket.into();
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    Ok(Connection::Unix(stream))
}
