//! Bounded JSONL framing over byte streams.

use std::io::{BufRead, BufReader, Read, Write};

use crate::codec::{encode_request, encode_response};
use crate::error::WireError;
use crate::message::{CommandRequest, CommandResponse};

/// Upper bound on a single frame, excluding its newline.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Reads newline-delimited frames, skipping blank lines.
///
/// A final frame without a trailing newline is still returned when the
/// stream ends.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    max_frame_bytes: usize,
    buffer: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    /// Wraps `reader` with the default frame limit.
    pub fn new(reader: R) -> Self {
        Self::with_limit(reader, DEFAULT_MAX_FRAME_BYTES)
    }

    /// Wraps `reader` with a custom frame limit.
    pub fn with_limit(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            max_frame_bytes,
            buffer: Vec::new(),
        }
    }

    /// Returns the next non-blank frame without its delimiter, or `None` at
    /// end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::FrameTooLarge`] when a frame exceeds the limit.
    /// The rest of that frame is discarded, so the next call resumes at the
    /// following frame. Returns [`WireError::Io`] when the stream fails.
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        let budget = u64::try_from(self.max_frame_bytes)
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        loop {
            self.buffer.clear();
            let read = (&mut self.reader)
                .take(budget)
                .read_until(b'\n', &mut self.buffer)?;
            if read == 0 {
                return Ok(None);
            }

            let terminated = self.buffer.last() == Some(&b'\n');
            if terminated {
                self.buffer.pop();
            }
            if self.buffer.len() > self.max_frame_bytes {
                self.buffer.clear();
                self.discard_through_newline()?;
                return Err(WireError::FrameTooLarge {
                    max_size: self.max_frame_bytes,
                });
            }
            if self.buffer.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(std::mem::take(&mut self.buffer)));
        }
    }

    /// Borrows the wrapped reader.
    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    /// Skips input up to and including the next newline, or to end of stream.
    fn discard_through_newline(&mut self) -> Result<(), WireError> {
        loop {
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                return Ok(());
            }
            if let Some(position) = available.iter().position(|byte| *byte == b'\n') {
                self.reader.consume(position + 1);
                return Ok(());
            }
            let skipped = available.len();
            self.reader.consume(skipped);
        }
    }
}

/// Writes framed messages, flushing after each one.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    /// Wraps an output stream.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a request frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub fn write_request(&mut self, request: &CommandRequest) -> Result<(), WireError> {
        let frame = encode_request(request)?;
        self.write_frame(&frame)
    }

    /// Writes a response frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub fn write_response(&mut self, response: &CommandResponse) -> Result<(), WireError> {
        let frame = encode_response(response)?;
        self.write_frame(&frame)
    }

    /// Writes pre-encoded bytes, appending the delimiter when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or flushing fails.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), WireError> {
        self.writer.write_all(frame)?;
        if frame.last() != Some(&b'\n') {
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Borrows the wrapped writer.
    pub const fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwraps the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
