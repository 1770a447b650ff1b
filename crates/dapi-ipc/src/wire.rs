//! Frame header and wire primitives.
//!
//! Every value on the wire is a 32-bit signed integer in big-endian order or
//! a run of raw bytes whose length was announced earlier in the frame.
//!
//! ```text
//! Header  { magic, sequence, code }
//! Record  { one slot per argument of the role's view, declared order }
//! Payload { per variable-length argument, declared order:
//!             string:     len raw bytes
//!             stringlist: count × (len, len raw bytes)
//!             intlist:    count × value }
//! ```

use std::io::{self, Read};

use crate::protocol::{Code, Sequence};

/// Largest string or list accepted by default, per field
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// Why a frame could not be decoded.
///
/// Any of these leaves the stream in an unknown position; the connection
/// must be dropped.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("connection closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("bad magic {0:#010x}")]
    BadMagic(i32),
    #[error("negative length {len} for `{field}`")]
    NegativeLength { field: String, len: i32 },
    #[error("`{field}` announces {len} items/bytes, limit is {limit}")]
    TooLarge {
        field: String,
        len: usize,
        limit: usize,
    },
    #[error("frame with unexpected code {0}")]
    UnexpectedCode(Code),
}

impl FrameError {
    /// The peer went away cleanly, as opposed to sending garbage
    pub fn is_closed(&self) -> bool {
        matches!(self, FrameError::Closed)
    }
}

/// Fixed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: i32,
    pub sequence: Sequence,
    pub code: Code,
}

impl Header {
    /// "DAPI" in ASCII
    pub const MAGIC: i32 = 0x4441_5049;

    /// Size of the header in bytes
    pub const SIZE: usize = 12;

    pub fn new(code: Code, sequence: Sequence) -> Self {
        Self {
            magic: Self::MAGIC,
            sequence,
            code,
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        put_i32(buf, self.magic);
        put_i32(buf, self.sequence);
        put_i32(buf, self.code);
    }

    /// Read a header and check its magic before trusting the rest
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, FrameError> {
        let mut raw = [0u8; Self::SIZE];
        read_exact(reader, &mut raw)?;
        let header = Self {
            magic: i32_at(&raw, 0),
            sequence: i32_at(&raw, 1),
            code: i32_at(&raw, 2),
        };
        if header.magic != Self::MAGIC {
            return Err(FrameError::BadMagic(header.magic));
        }
        Ok(header)
    }
}

pub(crate) fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// The `index`-th 32-bit slot of `raw`
pub(crate) fn i32_at(raw: &[u8], index: usize) -> i32 {
    let start = index * 4;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&raw[start..start + 4]);
    i32::from_be_bytes(bytes)
}

/// Fill `buf` completely; a peer that stops early is a closed connection
pub(crate) fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FrameError::Closed),
        Err(e) => Err(FrameError::Io(e)),
    }
}

pub(crate) fn read_i32<R: Read>(reader: &mut R) -> Result<i32, FrameError> {
    let mut bytes = [0u8; 4];
    read_exact(reader, &mut bytes)?;
    Ok(i32::from_be_bytes(bytes))
}

/// Validate an announced length against the limit
pub(crate) fn checked_len(field: &str, len: i32, limit: usize) -> Result<usize, FrameError> {
    let Ok(len) = usize::try_from(len) else {
        return Err(FrameError::NegativeLength {
            field: field.to_string(),
            len,
        });
    };
    if len > limit {
        return Err(FrameError::TooLarge {
            field: field.to_string(),
            len,
            limit,
        });
    }
    Ok(len)
}
