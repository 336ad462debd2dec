//! Persisted enable/disable state of the bridge service.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tempfile::Builder;
use thiserror::Error;

use hostbridge_config::RuntimePaths;

/// Storage for the service's last requested on/off position.
pub trait EnablementStore: Send + Sync {
    /// Reads the persisted state; `false` when nothing was stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the stored state cannot be read or parsed.
    fn load(&self) -> Result<bool, EnablementError>;

    /// Persists `enabled`.
    ///
    /// # Errors
    ///
    /// Returns an error when the state cannot be written.
    fn save(&self, enabled: bool) -> Result<(), EnablementError>;
}

/// Failures reading or writing the enablement state.
#[derive(Debug, Error)]
pub enum EnablementError {
    /// The state file exists but could not be read.
    #[error("failed to read service state '{path}': {source}")]
    Read {
        /// State file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The state file is not valid JSON.
    #[error("failed to parse service state '{path}': {source}")]
    Parse {
        /// State file path.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
    /// The state record could not be serialised.
    #[error("failed to encode service state: {source}")]
    Encode {
        /// Serialiser error.
        #[source]
        source: serde_json::Error,
    },
    /// The state file could not be written.
    #[error("failed to write service state '{path}': {source}")]
    Write {
        /// State file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct EnablementRecord {
    enabled: bool,
}

/// JSON file store, written atomically.
#[derive(Debug, Clone)]
pub struct FileEnablementStore {
    path: PathBuf,
}

impl FileEnablementStore {
    /// Stores state at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Stores state at the runtime directory's state file.
    #[must_use]
    pub fn from_runtime_paths(paths: &RuntimePaths) -> Self {
        Self::new(paths.state_path())
    }

    /// Location of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EnablementStore for FileEnablementStore {
    fn load(&self) -> Result<bool, EnablementError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(EnablementError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let record: EnablementRecord =
            serde_json::from_slice(&contents).map_err(|source| EnablementError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(record.enabled)
    }

    fn save(&self, enabled: bool) -> Result<(), EnablementError> {
        let mut contents = serde_json::to_vec(&EnablementRecord { enabled })
            .map_err(|source| EnablementError::Encode { source })?;
        contents.push(b'\n');
        atomic_write(&self.path, &contents).map_err(|source| EnablementError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Process-local store for tests and embedding hosts with their own settings.
#[derive(Debug, Default)]
pub struct MemoryEnablementStore {
    enabled: AtomicBool,
}

impl MemoryEnablementStore {
    /// Creates a store holding `enabled`.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }
}

impl EnablementStore for MemoryEnablementStore {
    fn load(&self) -> Result<bool, EnablementError> {
        Ok(self.enabled.load(Ordering::SeqCst))
    }

    fn save(&self, enabled: bool) -> Result<(), EnablementError> {
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

/// Writes `contents` to a temporary sibling and renames it over `path`.
fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "state path did not have a parent directory",
        )
    })?;

    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("hostbridged"),
    );
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(Permissions::from_mode(0o600));
    }

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
