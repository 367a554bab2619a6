//! Page codec for spill files.
//!
//! A spill file is a flat concatenation of frames, one per batch, readable
//! sequentially until end-of-file:
//!
//! ```text
//! frame   := payload_len:u32 | tuple_count:u32 | checksum:u32 | payload
//! payload := tuple*              (exactly tuple_count tuples)
//! tuple   := value*              (arity fixed by the schema)
//! value   := 0x01 i32:LE | 0x02 f32:LE | 0x03 len:u32 bytes
//! ```
//!
//! `checksum` is the CRC32 of the payload. End-of-file at a frame boundary
//! means end-of-stream; anything else - a torn header, a short payload, an
//! unknown tag, a length overrun, a checksum mismatch - is corruption and
//! is reported as such rather than silently truncating the stream.

use std::path::Path;

use bytes::{Buf, BufMut};
use grist_common::{GristError, GristResult, SPILL_FRAME_HEADER_SIZE};

use crate::batch::Batch;
use crate::tuple::Tuple;
use crate::value::Value;

/// Size of the fixed frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = SPILL_FRAME_HEADER_SIZE;

const TAG_INT: u8 = 0x01;
const TAG_FLOAT: u8 = 0x02;
const TAG_STRING: u8 = 0x03;

/// Parsed frame header.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Length of the payload that follows, in bytes.
    pub payload_len: u32,
    /// Number of tuples in the payload.
    pub tuple_count: u32,
    /// CRC32 of the payload.
    pub checksum: u32,
}

impl FrameHeader {
    /// Parses a header from its fixed-size byte representation.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; FRAME_HEADER_SIZE]) -> Self {
        let mut buf = &bytes[..];
        Self {
            payload_len: buf.get_u32_le(),
            tuple_count: buf.get_u32_le(),
            checksum: buf.get_u32_le(),
        }
    }
}

/// Encodes a batch into one complete frame (header plus payload).
#[must_use]
pub fn encode_batch(batch: &Batch) -> Vec<u8> {
    let mut payload = Vec::with_capacity(batch.len() * 16);
    for tuple in batch.iter() {
        for value in tuple.values() {
            encode_value(value, &mut payload);
        }
    }

    let checksum = crc32fast::hash(&payload);

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.put_u32_le(payload.len() as u32);
    frame.put_u32_le(batch.len() as u32);
    frame.put_u32_le(checksum);
    frame.extend_from_slice(&payload);
    frame
}

fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Int(v) => {
            buf.put_u8(TAG_INT);
            buf.put_i32_le(*v);
        }
        Value::Float(v) => {
            buf.put_u8(TAG_FLOAT);
            buf.put_f32_le(*v);
        }
        Value::String(s) => {
            buf.put_u8(TAG_STRING);
            buf.put_u32_le(s.len() as u32);
            buf.extend_from_slice(s.as_bytes());
        }
    }
}

/// Decodes a frame payload back into a batch.
///
/// `arity` is the tuple width fixed by the schema; `path` names the spill
/// file for error context. Verifies the checksum before touching the
/// payload.
pub fn decode_batch(
    header: &FrameHeader,
    payload: &[u8],
    arity: usize,
    path: &Path,
) -> GristResult<Batch> {
    let actual = crc32fast::hash(payload);
    if actual != header.checksum {
        return Err(GristError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: header.checksum,
            actual,
        });
    }

    let mut buf = payload;
    let mut tuples = Vec::with_capacity(header.tuple_count as usize);
    for _ in 0..header.tuple_count {
        let mut values = Vec::with_capacity(arity);
        for _ in 0..arity {
            values.push(decode_value(&mut buf, path)?);
        }
        tuples.push(Tuple::new(values));
    }

    if buf.has_remaining() {
        return Err(GristError::corruption(
            path,
            format!("{} trailing bytes after last tuple", buf.remaining()),
        ));
    }

    Ok(Batch::from_tuples(tuples))
}

fn decode_value(buf: &mut &[u8], path: &Path) -> GristResult<Value> {
    if !buf.has_remaining() {
        return Err(GristError::corruption(path, "payload ended before value tag"));
    }
    let tag = buf.get_u8();
    match tag {
        TAG_INT => {
            if buf.remaining() < 4 {
                return Err(GristError::corruption(path, "truncated int value"));
            }
            Ok(Value::Int(buf.get_i32_le()))
        }
        TAG_FLOAT => {
            if buf.remaining() < 4 {
                return Err(GristError::corruption(path, "truncated float value"));
            }
            Ok(Value::Float(buf.get_f32_le()))
        }
        TAG_STRING => {
            if buf.remaining() < 4 {
                return Err(GristError::corruption(path, "truncated string length"));
            }
            let len = buf.get_u32_le() as usize;
            if buf.remaining() < len {
                return Err(GristError::corruption(
                    path,
                    format!("string of {len} bytes overruns payload"),
                ));
            }
            let bytes = buf.copy_to_bytes(len);
            let s = String::from_utf8(bytes.to_vec())
                .map_err(|_| GristError::corruption(path, "string value is not valid UTF-8"))?;
            Ok(Value::String(s))
        }
        other => Err(GristError::corruption(
            path,
            format!("unknown value tag {other:#04x}"),
        )),
    }
}
