//! Wire types shared by the caller and executor sides of the host bridge.
//!
//! Every message travels as one JSON document per line (JSONL). Field names
//! are PascalCase on the wire:
//!
//! ```text
//! {"CommandName":"get_all_levels","Parameters":{},"RequestId":"r1"}
//! {"Success":true,"Data":{"Count":0,"Levels":[]},"RequestId":"r1"}
//! ```
//!
//! The crate stays free of transport concerns: [`FrameReader`] and
//! [`FrameWriter`] work over any `Read` or `Write`.

mod codec;
mod error;
mod frame;
mod message;
mod state;

pub use codec::{
    decode_request, decode_response, encode_request, encode_response, salvage_request_id,
};
pub use error::WireError;
pub use frame::{DEFAULT_MAX_FRAME_BYTES, FrameReader, FrameWriter};
pub use message::{CommandRequest, CommandResponse, GENERIC_FAILURE, Parameters, RequestId};
pub use state::ConnectionState;
