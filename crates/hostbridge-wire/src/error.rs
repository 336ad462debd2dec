//! Errors raised while framing or decoding bridge messages.

use std::io;

use thiserror::Error;

/// Failures surfaced by the codec and frame helpers.
#[derive(Debug, Error)]
pub enum WireError {
    /// The frame was not valid JSON for the expected message.
    #[error("malformed frame: {message}")]
    MalformedJson {
        /// Parser diagnostic.
        message: String,
        /// Underlying parser error, when one exists.
        #[source]
        source: Option<serde_json::Error>,
    },
    /// The frame parsed but violates a structural rule.
    #[error("invalid message structure: {message}")]
    InvalidStructure {
        /// Which rule was violated.
        message: String,
    },
    /// The frame exceeded the reader's byte limit.
    #[error("frame too large: exceeds {max_size} byte limit")]
    FrameTooLarge {
        /// Configured limit in bytes.
        max_size: usize,
    },
    /// Reading or writing the underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A message could not be serialised.
    #[error("failed to serialise message: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl WireError {
    pub(crate) fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJson {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJson {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Returns `true` when the stream can keep being read after this error.
    ///
    /// Content errors and oversize frames concern a single frame, which the
    /// reader has already skipped. I/O failures leave the stream in an
    /// unknown position.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedJson { .. } | Self::InvalidStructure { .. } | Self::FrameTooLarge { .. }
        )
    }
}
