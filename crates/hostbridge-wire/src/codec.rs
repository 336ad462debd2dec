//! Conversion between messages and newline-terminated frames.

use serde::Serialize;
use serde_json::Value;

use crate::error::WireError;
use crate::message::{CommandRequest, CommandResponse, RequestId};

/// Serialises a request into a newline-terminated frame.
///
/// # Errors
///
/// Returns [`WireError::Serialize`] when serialisation fails.
pub fn encode_request(request: &CommandRequest) -> Result<Vec<u8>, WireError> {
    encode(request)
}

/// Serialises a response into a newline-terminated frame.
///
/// # Errors
///
/// Returns [`WireError::Serialize`] when serialisation fails.
pub fn encode_response(response: &CommandResponse) -> Result<Vec<u8>, WireError> {
    encode(response)
}

fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, WireError> {
    let mut frame = serde_json::to_vec(message).map_err(WireError::Serialize)?;
    frame.push(b'\n');
    Ok(frame)
}

/// Parses and validates a request frame.
///
/// # Errors
///
/// Returns [`WireError::MalformedJson`] for empty or unparsable frames and
/// [`WireError::InvalidStructure`] when the command name or request id is
/// blank.
pub fn decode_request(frame: &[u8]) -> Result<CommandRequest, WireError> {
    let request: CommandRequest = parse(frame)?;
    if request.command().is_empty() {
        return Err(WireError::invalid_structure("CommandName is empty"));
    }
    if request.request_id.is_blank() {
        return Err(WireError::invalid_structure("RequestId is empty"));
    }
    Ok(request)
}

/// Parses and validates a response frame.
///
/// # Errors
///
/// Returns [`WireError::MalformedJson`] for empty or unparsable frames and
/// [`WireError::InvalidStructure`] when the request id is blank.
pub fn decode_response(frame: &[u8]) -> Result<CommandResponse, WireError> {
    let response: CommandResponse = parse(frame)?;
    if response.request_id.is_blank() {
        return Err(WireError::invalid_structure("RequestId is empty"));
    }
    Ok(response)
}

/// Recovers the request id from a frame that failed full decoding.
///
/// Succeeds whenever the frame is a JSON object with a non-blank string
/// `RequestId`, regardless of the other fields.
#[must_use]
pub fn salvage_request_id(frame: &[u8]) -> Option<RequestId> {
    let value: Value = serde_json::from_slice(trim_trailing_whitespace(frame)).ok()?;
    let id = value.get("RequestId")?.as_str()?;
    let id = RequestId::new(id);
    (!id.is_blank()).then_some(id)
}

fn parse<T: serde::de::DeserializeOwned>(frame: &[u8]) -> Result<T, WireError> {
    let trimmed = trim_trailing_whitespace(frame);
    if trimmed.is_empty() {
        return Err(WireError::malformed("empty frame"));
    }
    serde_json::from_slice(trimmed).map_err(WireError::from_json_error)
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.get(..end).unwrap_or_default()
}
