//! Runtime artefact locations shared by both binaries.
//!
//! The executor persists whether the bridge was enabled so a restarted host
//! can resume serving without an explicit start. The state file lives next to
//! the Unix socket when one is configured, otherwise in the per-user runtime
//! directory.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{Config, SocketEndpoint};

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

const STATE_FILE_NAME: &str = "hostbridged.state.json";
const RUNTIME_SUBDIR: &str = "hostbridge";

/// Canonical paths for runtime artefacts written by the executor.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    state_path: PathBuf,
}

impl RuntimePaths {
    /// Derives runtime paths from the shared configuration, creating the
    /// runtime directory when missing.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        let runtime_dir = runtime_directory(config.bridge_socket())?;
        Self::in_directory(runtime_dir)
    }

    /// Uses an explicit runtime directory.
    pub fn in_directory(runtime_dir: impl Into<PathBuf>) -> Result<Self, RuntimePathsError> {
        let runtime_dir = runtime_dir.into();
        fs::create_dir_all(&runtime_dir).map_err(|source| RuntimePathsError::RuntimeDirectory {
            path: runtime_dir.clone(),
            source,
        })?;
        Ok(Self {
            state_path: runtime_dir.join(STATE_FILE_NAME),
            runtime_dir,
        })
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// Path of the persisted enablement state.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        self.state_path.as_path()
    }
}

fn runtime_directory(endpoint: &SocketEndpoint) -> Result<PathBuf, RuntimePathsError> {
    match endpoint {
        SocketEndpoint::Unix { path } => path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .map(|parent| parent.as_std_path().to_path_buf())
            .ok_or_else(|| RuntimePathsError::MissingSocketParent {
                path: path.to_string(),
            }),
        SocketEndpoint::Tcp { .. } => Ok(default_runtime_directory()),
    }
}

fn default_runtime_directory() -> PathBuf {
    #[cfg(unix)]
    {
        if let Some(mut dir) = runtime_dir() {
            dir.push(RUNTIME_SUBDIR);
            return dir;
        }
        let mut dir = env::temp_dir();
        dir.push(RUNTIME_SUBDIR);
        // SAFETY: geteuid has no preconditions and cannot fail.
        dir.push(format!("uid-{}", unsafe { geteuid() }));
        dir
    }

    #[cfg(not(unix))]
    {
        let mut dir = env::temp_dir();
        dir.push(RUNTIME_SUBDIR);
        dir
    }
}

/// Errors raised while deriving runtime paths.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// The Unix socket path lacked a parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingSocketParent {
        /// Offending socket path.
        path: String,
    },
    /// Creating the runtime directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
