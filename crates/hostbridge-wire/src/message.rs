//! Request and response envelopes.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Message used when a failure carries no usable text.
pub const GENERIC_FAILURE: &str = "command failed without an error message";

/// Opaque key to value map passed to a command.
pub type Parameters = serde_json::Map<String, Value>;

static NULL_DATA: Value = Value::Null;

/// Caller-assigned identifier echoed verbatim in the matching response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wraps an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` when the identifier is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for RequestId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A named command with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandRequest {
    /// Command name; matched case-insensitively by the executor.
    pub command_name: String,
    /// Command arguments. `null` or an absent field decode as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub parameters: Parameters,
    /// Correlation identifier.
    pub request_id: RequestId,
}

impl CommandRequest {
    /// Builds a request.
    #[must_use]
    pub fn new(
        command_name: impl Into<String>,
        parameters: Parameters,
        request_id: impl Into<RequestId>,
    ) -> Self {
        Self {
            command_name: command_name.into(),
            parameters,
            request_id: request_id.into(),
        }
    }

    /// Command name with surrounding whitespace removed.
    #[must_use]
    pub fn command(&self) -> &str {
        self.command_name.trim()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Parameters, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Parameters>::deserialize(deserializer)?.unwrap_or_default())
}

/// Outcome of one command, correlated by [`RequestId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandResponse {
    /// Selects whether `data` or `error` is meaningful.
    pub success: bool,
    /// Result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Identifier copied from the request.
    pub request_id: RequestId,
}

impl CommandResponse {
    /// Builds a successful response.
    #[must_use]
    pub const fn success(request_id: RequestId, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            request_id,
        }
    }

    /// Builds a failed response. An empty message is replaced by
    /// [`GENERIC_FAILURE`].
    #[must_use]
    pub fn failure(request_id: RequestId, message: impl Into<String>) -> Self {
        let message = message.into();
        let error = if message.trim().is_empty() {
            GENERIC_FAILURE.to_owned()
        } else {
            message
        };
        Self {
            success: false,
            data: None,
            error: Some(error),
            request_id,
        }
    }

    /// Returns the payload (`null` when absent) or the failure text.
    ///
    /// # Errors
    ///
    /// Returns the error message when `success` is false.
    pub fn outcome(&self) -> Result<&Value, &str> {
        if self.success {
            return Ok(self.data.as_ref().unwrap_or(&NULL_DATA));
        }
        match self.error.as_deref() {
            Some(message) if !message.trim().is_empty() => Err(message),
            _ => Err(GENERIC_FAILURE),
        }
    }

    /// Consumes the response, yielding the payload or the failure text.
    ///
    /// # Errors
    ///
    /// Returns the error message when `success` is false.
    pub fn into_outcome(self) -> Result<Value, String> {
        if self.success {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        match self.error {
            Some(message) if !message.trim().is_empty() => Err(message),
            _ => Err(GENERIC_FAILURE.to_owned()),
        }
    }
}
