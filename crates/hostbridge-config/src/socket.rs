use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Socket the executor listens on and the caller dials.
///
/// Serialised with a `transport` tag so TOML files read naturally:
/// `bridge_socket = { transport = "tcp", host = "127.0.0.1", port = 8765 }`.
/// The URL form (`tcp://host:port`, `unix:///path`) is accepted wherever a
/// plain string is supplied, such as environment variables.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(
    tag = "transport",
    rename_all = "snake_case",
    try_from = "SocketEndpointRepr"
)]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix {
        /// Filesystem path of the socket.
        path: Utf8PathBuf,
    },
    /// TCP socket endpoint.
    Tcp {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Returns the socket path for Unix endpoints.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }

    /// Returns `host:port` for TCP endpoints.
    #[must_use]
    pub fn tcp_address(&self) -> Option<String> {
        match self {
            Self::Tcp { host, port } => Some(format!("{host}:{port}")),
            Self::Unix { .. } => None,
        }
    }

    /// Creates the parent directory of a Unix socket with owner-only access.
    ///
    /// TCP endpoints need no filesystem preparation.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .ok_or_else(|| SocketPreparationError::MissingParent {
                path: path.to_path_buf(),
            })?;

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        match builder.create(parent.as_std_path()) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(source) => Err(SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SocketEndpointRepr {
    Url(String),
    Table(TaggedEndpoint),
}

#[derive(Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
enum TaggedEndpoint {
    Unix { path: Utf8PathBuf },
    Tcp { host: String, port: u16 },
}

impl TryFrom<SocketEndpointRepr> for SocketEndpoint {
    type Error = SocketParseError;

    fn try_from(repr: SocketEndpointRepr) -> Result<Self, Self::Error> {
        match repr {
            SocketEndpointRepr::Url(text) => text.parse(),
            SocketEndpointRepr::Table(TaggedEndpoint::Unix { path }) => Ok(Self::Unix { path }),
            SocketEndpointRepr::Table(TaggedEndpoint::Tcp { host, port }) => {
                Ok(Self::Tcp { host, port })
            }
        }
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" => {
                let path = url.path();
                if path.is_empty() || path == "/" {
                    return Err(SocketParseError::MissingUnixPath(input.to_owned()));
                }
                Ok(Self::unix(path))
            }
            "tcp" => {
                let host = url
                    .host_str()
                    .filter(|host| !host.is_empty())
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
                let port = url
                    .port()
                    .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
                Ok(Self::tcp(host, port))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Errors encountered while parsing a [`SocketEndpoint`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme was neither `tcp` nor `unix`.
    #[error("unsupported socket scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// The text was not a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised when preparing a Unix socket directory.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path has no parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Offending socket path.
        path: Utf8PathBuf,
    },
    /// Creating the parent directory failed.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    #[rstest]
    #[case::tcp("tcp://127.0.0.1:8765", SocketEndpoint::tcp("127.0.0.1", 8765))]
    #[case::named_host("tcp://localhost:9000", SocketEndpoint::tcp("localhost", 9000))]
    #[case::unix("unix:///tmp/hostbridge.sock", SocketEndpoint::unix("/tmp/hostbridge.sock"))]
    fn parses_endpoints(#[case] input: &str, #[case] expected: SocketEndpoint) {
        let parsed: SocketEndpoint = input.parse().expect("parse endpoint");
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), input);
    }

    #[rstest]
    #[case::no_port("tcp://127.0.0.1")]
    #[case::bad_scheme("ws://127.0.0.1:8765")]
    #[case::empty_unix("unix://")]
    #[case::not_a_url("127.0.0.1:8765")]
    fn rejects_malformed_endpoints(#[case] input: &str) {
        assert!(input.parse::<SocketEndpoint>().is_err(), "{input} parsed");
    }

    #[test]
    fn deserialises_url_strings_and_tagged_tables() {
        let from_url: SocketEndpoint =
            serde_json::from_str("\"tcp://127.0.0.1:9100\"").expect("url form");
        let from_table: SocketEndpoint =
            serde_json::from_str(r#"{"transport":"tcp","host":"127.0.0.1","port":9100}"#)
                .expect("table form");
        assert_eq!(from_url, from_table);
    }

    #[test]
    fn tcp_address_joins_host_and_port() {
        let endpoint = SocketEndpoint::tcp("127.0.0.1", 8765);
        assert_eq!(endpoint.tcp_address().as_deref(), Some("127.0.0.1:8765"));
        assert!(endpoint.unix_path().is_none());
    }

    #[test]
    fn prepare_filesystem_creates_socket_directory() {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 temp dir");
        let endpoint = SocketEndpoint::unix(root.join("nested/run/bridge.sock"));

        endpoint.prepare_filesystem().expect("prepare socket dir");
        endpoint.prepare_filesystem().expect("prepare is idempotent");

        assert!(root.join("nested/run").is_dir());
    }

    #[test]
    fn prepare_filesystem_rejects_bare_socket_name() {
        let endpoint = SocketEndpoint::unix("bridge.sock");
        let error = endpoint
            .prepare_filesystem()
            .expect_err("bare socket names have no parent");
        assert!(matches!(error, SocketPreparationError::MissingParent { .. }));
    }
}
