// src/core/protocol/frame.rs

//! `Frame` is the unit of the wire protocol, and `FrameCodec` decodes/encodes
//! it over a byte stream using `tokio_util::codec`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::errors::StoreError;

/// Maximum number of elements accepted in a single `Array` frame. Guards
/// against a malicious or buggy peer claiming an unbounded array length.
const MAX_FRAME_ELEMENTS: usize = 1024 * 1024;

/// Maximum accepted length for a single bulk-style payload.
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    /// `None` is the distinguished null bulk string (`$-1\r\n`).
    BulkString(Option<Bytes>),
    Array(Vec<Frame>),
    /// `$<len>\r\n<len bytes>` with **no** trailing CRLF. Used exactly once,
    /// for the initial follower snapshot sync.
    RdbBlob(Bytes),
}

impl Frame {
    pub fn simple(s: impl Into<String>) -> Self {
        Frame::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Frame::Error(s.into())
    }

    pub fn bulk(bytes: impl Into<Bytes>) -> Self {
        Frame::BulkString(Some(bytes.into()))
    }

    pub fn null_bulk() -> Self {
        Frame::BulkString(None)
    }

    pub fn array(frames: Vec<Frame>) -> Self {
        Frame::Array(frames)
    }

    /// Builds the canonical `Array` of `BulkString`s used to send a command,
    /// e.g. `Frame::command(&["REPLCONF", "ACK", "0"])`.
    pub fn command(parts: &[impl AsRef<[u8]>]) -> Self {
        Frame::Array(
            parts
                .iter()
                .map(|p| Frame::bulk(Bytes::copy_from_slice(p.as_ref())))
                .collect(),
        )
    }

    /// Encodes this frame into a fresh buffer and returns its bytes.
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_frame(self, &mut buf);
        buf.freeze()
    }
}

/// A frame decoded off the wire, paired with the exact number of bytes it
/// occupied. Needed both for follower offset accounting and for
/// byte-identical leader-side propagation (the leader forwards `raw`
/// verbatim, never a re-encoded frame).
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub frame: Frame,
    pub raw: Bytes,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = DecodedFrame;
    type Error = StoreError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match parse_frame(src)? {
            Some((frame, len)) => {
                let raw = Bytes::copy_from_slice(&src[..len]);
                src.advance(len);
                Ok(Some(DecodedFrame { frame, raw }))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = StoreError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst);
        Ok(())
    }
}

fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    match frame {
        Frame::SimpleString(s) => {
            dst.put_u8(b'+');
            dst.put_slice(s.as_bytes());
            dst.put_slice(b"\r\n");
        }
        Frame::Error(s) => {
            dst.put_u8(b'-');
            dst.put_slice(s.as_bytes());
            dst.put_slice(b"\r\n");
        }
        Frame::Integer(n) => {
            dst.put_u8(b':');
            dst.put_slice(n.to_string().as_bytes());
            dst.put_slice(b"\r\n");
        }
        Frame::BulkString(None) => {
            dst.put_slice(b"$-1\r\n");
        }
        Frame::BulkString(Some(bytes)) => {
            dst.put_u8(b'$');
            dst.put_slice(bytes.len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
            dst.put_slice(bytes);
            dst.put_slice(b"\r\n");
        }
        Frame::Array(items) => {
            dst.put_u8(b'*');
            dst.put_slice(items.len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
            for item in items {
                encode_frame(item, dst);
            }
        }
        Frame::RdbBlob(bytes) => {
            dst.put_u8(b'$');
            dst.put_slice(bytes.len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
            dst.put_slice(bytes);
            // No trailing CRLF: the one deliberate asymmetry in this protocol.
        }
    }
}

/// Finds the index of the next `\r\n` in `src`, if any.
fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(2).position(|w| w == b"\r\n")
}

/// Parses a single line (up to but excluding `\r\n`) starting at the buffer
/// front. Returns `(line, consumed_including_crlf)`.
fn parse_line(src: &[u8]) -> Result<Option<(&[u8], usize)>, StoreError> {
    match find_crlf(src) {
        Some(pos) => Ok(Some((&src[..pos], pos + 2))),
        None => Ok(None),
    }
}

/// Attempts to parse one top-level frame from the front of `src`. Returns
/// `Ok(None)` when `src` holds an incomplete frame (the decoder must wait
/// for more bytes rather than guessing), never partially consuming it.
fn parse_frame(src: &[u8]) -> Result<Option<(Frame, usize)>, StoreError> {
    if src.is_empty() {
        return Ok(None);
    }
    let tag = src[0];
    let rest = &src[1..];
    match tag {
        b'+' => match parse_line(rest)? {
            Some((line, used)) => {
                let text = String::from_utf8(line.to_vec())
                    .map_err(|_| StoreError::Malformed("invalid utf-8 in simple string".into()))?;
                Ok(Some((Frame::SimpleString(text), 1 + used)))
            }
            None => Ok(None),
        },
        b'-' => match parse_line(rest)? {
            Some((line, used)) => {
                let text = String::from_utf8(line.to_vec())
                    .map_err(|_| StoreError::Malformed("invalid utf-8 in error".into()))?;
                Ok(Some((Frame::Error(text), 1 + used)))
            }
            None => Ok(None),
        },
        b':' => match parse_line(rest)? {
            Some((line, used)) => {
                let text = std::str::from_utf8(line)
                    .map_err(|_| StoreError::Malformed("invalid utf-8 in integer".into()))?;
                let n = text
                    .parse::<i64>()
                    .map_err(|_| StoreError::Malformed(format!("invalid integer: {text}")))?;
                Ok(Some((Frame::Integer(n), 1 + used)))
            }
            None => Ok(None),
        },
        b'$' => parse_bulk_string(rest).map(|opt| opt.map(|(f, used)| (f, 1 + used))),
        b'*' => parse_array(rest).map(|opt| opt.map(|(f, used)| (f, 1 + used))),
        other => Err(StoreError::Malformed(format!(
            "unknown frame prefix byte: {other:#x}"
        ))),
    }
}

fn parse_bulk_string(rest: &[u8]) -> Result<Option<(Frame, usize)>, StoreError> {
    let (len_line, header_len) = match parse_line(rest)? {
        Some(v) => v,
        None => return Ok(None),
    };
    let len_text = std::str::from_utf8(len_line)
        .map_err(|_| StoreError::Malformed("invalid utf-8 in bulk length".into()))?;
    let len: i64 = len_text
        .parse()
        .map_err(|_| StoreError::Malformed(format!("invalid bulk length: {len_text}")))?;

    if len == -1 {
        return Ok(Some((Frame::BulkString(None), header_len)));
    }
    if len < 0 {
        return Err(StoreError::Malformed(format!(
            "negative bulk length: {len}"
        )));
    }
    let len = len as usize;
    if len > MAX_BULK_LEN {
        return Err(StoreError::Malformed(format!(
            "bulk length {len} exceeds maximum"
        )));
    }
    let needed = header_len + len + 2;
    if rest.len() < needed {
        return Ok(None);
    }
    let payload = Bytes::copy_from_slice(&rest[header_len..header_len + len]);
    if &rest[header_len + len..header_len + len + 2] != b"\r\n" {
        return Err(StoreError::Malformed(
            "bulk string missing trailing CRLF".into(),
        ));
    }
    Ok(Some((Frame::BulkString(Some(payload)), needed)))
}

fn parse_array(rest: &[u8]) -> Result<Option<(Frame, usize)>, StoreError> {
    let (len_line, mut consumed) = match parse_line(rest)? {
        Some(v) => v,
        None => return Ok(None),
    };
    let len_text = std::str::from_utf8(len_line)
        .map_err(|_| StoreError::Malformed("invalid utf-8 in array length".into()))?;
    let len: i64 = len_text
        .parse()
        .map_err(|_| StoreError::Malformed(format!("invalid array length: {len_text}")))?;
    if len < 0 {
        // Redis-style null array; treat as an empty array since this store
        // never emits one and never needs to distinguish it from empty.
        return Ok(Some((Frame::Array(Vec::new()), consumed)));
    }
    let len = len as usize;
    if len > MAX_FRAME_ELEMENTS {
        return Err(StoreError::Malformed(format!(
            "array length {len} exceeds maximum"
        )));
    }
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        match parse_frame(&rest[consumed..])? {
            Some((frame, used)) => {
                items.push(frame);
                consumed += used;
            }
            None => return Ok(None),
        }
    }
    Ok(Some((Frame::Array(items), consumed)))
}

/// Reads a `RdbBlob` (`$<len>\r\n<len bytes>`, no trailing CRLF) off a raw
/// buffer. Unlike the normal bulk-string grammar this is only ever used
/// manually against an unframed stream during the handshake, never through
/// `FrameCodec::decode`.
pub fn parse_rdb_header(line: &[u8]) -> Result<usize, StoreError> {
    if line.first() != Some(&b'$') {
        return Err(StoreError::Malformed(
            "expected '$' snapshot length header".into(),
        ));
    }
    let text = std::str::from_utf8(&line[1..])
        .map_err(|_| StoreError::Malformed("invalid utf-8 in snapshot length".into()))?;
    text.parse::<usize>()
        .map_err(|_| StoreError::Malformed(format!("invalid snapshot length: {text}")))
}
