//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! Every envelope is a single MessagePack array:
//! ```text
//! Request:       [0, msgid, operation, [bin, ...]]
//! Response:      [1, msgid, error,     bin | nil ]
//! Notification:  [2, code,  [bin, ...]]
//! ```
//!
//! MessagePack is length-prefixed all the way down, so envelopes are written
//! back-to-back with no extra framing. [`frame_len`] tells a stream reader how
//! many buffered bytes the next envelope occupies.

use std::io::{self, Read, Write};

use bytes::{Buf, BytesMut};
use rmp::Marker;
use rmpv::Value;

use crate::error::{KeywardError, Result};
use super::dispatch::classify;
use super::envelope::Envelope;

/// Maximum envelope size accepted from a stream (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Bytes pulled from the stream per read call
const READ_CHUNK: usize = 4096;

// =============================================================================
// Envelope Encoding/Decoding
// =============================================================================

/// Encode an envelope to bytes
///
/// Fails if any field lies outside its declared domain: an unknown tag, a
/// msgid that is not a u32, or an argument that is not a byte string.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    classify(envelope).map_err(|e| KeywardError::Encoding(e.to_string()))?;

    let mut buf = Vec::with_capacity(estimate_len(envelope));
    rmpv::encode::write_value(&mut buf, &envelope.to_value())
        .map_err(|e| KeywardError::Encoding(e.to_string()))?;
    Ok(buf)
}

/// Decode exactly one envelope from bytes
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    let mut rest = bytes;
    let value = rmpv::decode::read_value(&mut rest).map_err(|e| {
        if is_eof(&e) {
            KeywardError::Decoding(format!("truncated envelope ({} bytes)", bytes.len()))
        } else {
            KeywardError::Decoding(e.to_string())
        }
    })?;

    if !rest.is_empty() {
        return Err(KeywardError::Decoding(format!(
            "{} trailing bytes after envelope",
            rest.len()
        )));
    }

    Envelope::from_value(value)
}

/// How much of a buffer the envelope at its start occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameScan {
    /// The envelope is buffered and spans this many bytes
    Complete(usize),
    /// The envelope needs at least this many bytes in total
    Incomplete(usize),
}

/// What follows a marker byte
#[derive(Clone, Copy)]
enum Shape {
    /// A fixed number of payload bytes
    Fixed(usize),
    /// A big-endian length of `width` bytes, then that many bytes plus `extra`
    Sized { width: usize, extra: usize },
    /// A fixed number of nested values
    Nested(usize),
    /// A big-endian count of `width` bytes, then `per` nested values per count
    Counted { width: usize, per: usize },
}

fn shape(marker: Marker) -> Result<Shape> {
    Ok(match marker {
        Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True | Marker::False => {
            Shape::Fixed(0)
        }
        Marker::U8 | Marker::I8 => Shape::Fixed(1),
        Marker::U16 | Marker::I16 => Shape::Fixed(2),
        Marker::U32 | Marker::I32 | Marker::F32 => Shape::Fixed(4),
        Marker::U64 | Marker::I64 | Marker::F64 => Shape::Fixed(8),
        Marker::FixStr(n) => Shape::Fixed(usize::from(n)),
        Marker::Str8 | Marker::Bin8 => Shape::Sized { width: 1, extra: 0 },
        Marker::Str16 | Marker::Bin16 => Shape::Sized { width: 2, extra: 0 },
        Marker::Str32 | Marker::Bin32 => Shape::Sized { width: 4, extra: 0 },
        Marker::FixArray(n) => Shape::Nested(usize::from(n)),
        Marker::Array16 => Shape::Counted { width: 2, per: 1 },
        Marker::Array32 => Shape::Counted { width: 4, per: 1 },
        Marker::FixMap(n) => Shape::Nested(2 * usize::from(n)),
        Marker::Map16 => Shape::Counted { width: 2, per: 2 },
        Marker::Map32 => Shape::Counted { width: 4, per: 2 },
        // Type byte plus payload
        Marker::FixExt1 => Shape::Fixed(2),
        Marker::FixExt2 => Shape::Fixed(3),
        Marker::FixExt4 => Shape::Fixed(5),
        Marker::FixExt8 => Shape::Fixed(9),
        Marker::FixExt16 => Shape::Fixed(17),
        Marker::Ext8 => Shape::Sized { width: 1, extra: 1 },
        Marker::Ext16 => Shape::Sized { width: 2, extra: 1 },
        Marker::Ext32 => Shape::Sized { width: 4, extra: 1 },
        Marker::Reserved => {
            return Err(KeywardError::Decoding("reserved marker 0xc1".to_string()))
        }
    })
}

fn read_be(bytes: &[u8]) -> usize {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | usize::from(b))
}

/// Size the envelope at the start of `bytes` from its headers alone
///
/// Only markers and length fields are read, never payloads, so the cost is
/// proportional to the number of values rather than the number of bytes.
/// An error means the stream holds bytes that can never become a valid
/// MessagePack value.
pub fn scan_frame(bytes: &[u8]) -> Result<FrameScan> {
    let mut pos = 0usize;
    // Values still to skip; each needs at least one more byte
    let mut pending = 1usize;

    while pending > 0 {
        let Some(&byte) = bytes.get(pos) else {
            return Ok(FrameScan::Incomplete(pos.saturating_add(pending)));
        };
        pending -= 1;
        pos += 1;

        let kind = shape(Marker::from_u8(byte))?;
        let declared = match kind {
            Shape::Sized { width, .. } | Shape::Counted { width, .. } => {
                let Some(field) = bytes.get(pos..pos + width) else {
                    return Ok(FrameScan::Incomplete((pos + width).saturating_add(pending)));
                };
                pos += width;
                read_be(field)
            }
            Shape::Fixed(_) | Shape::Nested(_) => 0,
        };
        let (body, children) = match kind {
            Shape::Fixed(n) => (n, 0),
            Shape::Sized { extra, .. } => (declared.saturating_add(extra), 0),
            Shape::Nested(n) => (0, n),
            Shape::Counted { per, .. } => (0, declared.saturating_mul(per)),
        };

        pos = pos.saturating_add(body);
        pending = pending.saturating_add(children);
        if pos > bytes.len() {
            return Ok(FrameScan::Incomplete(pos.saturating_add(pending)));
        }
    }

    Ok(FrameScan::Complete(pos))
}

/// Length in bytes of the next complete envelope at the start of `bytes`
///
/// Returns `Ok(None)` if more bytes are needed. An error means the stream
/// holds bytes that can never become a valid MessagePack value.
pub fn frame_len(bytes: &[u8]) -> Result<Option<usize>> {
    match scan_frame(bytes)? {
        FrameScan::Complete(len) => Ok(Some(len)),
        FrameScan::Incomplete(_) => Ok(None),
    }
}

fn is_eof(err: &rmpv::decode::Error) -> bool {
    match err {
        rmpv::decode::Error::InvalidMarkerRead(e) | rmpv::decode::Error::InvalidDataRead(e) => {
            e.kind() == io::ErrorKind::UnexpectedEof
        }
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

fn estimate_len(envelope: &Envelope) -> usize {
    envelope
        .fields()
        .iter()
        .map(|v| match v {
            Value::Binary(b) => b.len() + 5,
            Value::Array(items) => items
                .iter()
                .map(|i| i.as_slice().map_or(9, |b| b.len() + 5))
                .sum::<usize>()
                + 5,
            _ => 9,
        })
        .sum::<usize>()
        + 1
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Pulls whole envelopes off a byte stream
pub struct FrameReader<R> {
    reader: R,
    buffer: BytesMut,
    max_frame_size: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_frame_size(reader, MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(reader: R, max_frame_size: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            max_frame_size,
        }
    }

    /// Read the bytes of the next complete envelope
    ///
    /// Blocks until a whole envelope is buffered. Returns `Ok(None)` when the
    /// peer closes the stream between envelopes. Each read asks for at least
    /// the bytes the buffered headers still declare, and an envelope declared
    /// larger than the limit is refused before its body is read.
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let needed = match scan_frame(&self.buffer)? {
                FrameScan::Complete(len) => {
                    self.check_size(len)?;
                    let frame = self.buffer[..len].to_vec();
                    self.buffer.advance(len);
                    return Ok(Some(frame));
                }
                FrameScan::Incomplete(needed) => needed,
            };
            self.check_size(needed)?;

            let start = self.buffer.len();
            let want = needed.saturating_sub(start).max(READ_CHUNK);
            self.buffer.resize(start + want, 0);
            let n = match self.reader.read(&mut self.buffer[start..]) {
                Ok(n) => n,
                Err(e) => {
                    self.buffer.truncate(start);
                    return Err(e.into());
                }
            };
            self.buffer.truncate(start + n);

            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(KeywardError::Decoding(format!(
                    "stream closed with {} bytes of a partial envelope",
                    self.buffer.len()
                )));
            }
        }
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_frame_size {
            return Err(KeywardError::Decoding(format!(
                "Envelope too large: {} bytes (max {})",
                len, self.max_frame_size
            )));
        }
        Ok(())
    }

    /// Read and decode the next envelope
    pub fn read_envelope(&mut self) -> Result<Option<Envelope>> {
        match self.read_frame()? {
            Some(frame) => decode(&frame).map(Some),
            None => Ok(None),
        }
    }

    /// Bytes buffered but not yet returned
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }
}

/// Write an envelope to a stream
pub fn write_envelope<W: Write>(writer: &mut W, envelope: &Envelope) -> Result<()> {
    let bytes = encode(envelope)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
