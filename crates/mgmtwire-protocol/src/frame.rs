//! Native protocol frame header codec.
//!
//! A frame is `version flags stream opcode length body`, big-endian. The
//! stream identifier is one signed byte for v1 and v2 and two bytes from v3
//! onwards. The high bit of the version byte marks server responses.

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::buffer::{FramePool, SourceFrame};
use crate::error::CodecError;
use crate::kind::{Direction, MessageKind};
use crate::version::{ProtocolVersion, ProtocolVersionLimit};

const DIRECTION_BIT: u8 = 0x80;
const VERSION_MASK: u8 = 0x7F;
const WIDE_STREAM_FROM: u8 = 3;
const MAX_HEADER_TAIL: usize = 8;

/// Identifier multiplexing request/response exchanges over one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(i16);

impl StreamId {
    /// Stream used for connection-level errors that have no request.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw stream identifier.
    #[must_use]
    pub const fn new(raw: i16) -> Self {
        Self(raw)
    }

    /// Raw stream identifier.
    #[must_use]
    pub const fn get(self) -> i16 {
        self.0
    }
}

impl From<i16> for StreamId {
    fn from(raw: i16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

/// Header flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Body is compressed with the negotiated algorithm.
    pub const COMPRESSED: Self = Self(0x01);
    /// Client requested tracing.
    pub const TRACING: Self = Self(0x02);
    /// Body starts with a custom payload map.
    pub const CUSTOM_PAYLOAD: Self = Self(0x04);
    /// Body starts with a warnings string list.
    pub const WARNING: Self = Self(0x08);
    /// Client opted into a beta protocol version.
    pub const USE_BETA: Self = Self(0x10);

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wraps raw header bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw header bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol version of the frame.
    pub version: ProtocolVersion,
    /// Header flags.
    pub flags: FrameFlags,
    /// Stream the frame belongs to.
    pub stream_id: StreamId,
    /// Message kind named by the opcode.
    pub kind: MessageKind,
}

/// One inbound frame with its body held in a pooled buffer.
#[derive(Debug)]
pub struct Frame {
    /// Decoded header.
    pub header: FrameHeader,
    /// Body bytes.
    pub body: SourceFrame,
}

/// Reads request frames from a byte stream.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    limit: ProtocolVersionLimit,
    max_body: usize,
    pool: FramePool,
}

impl FrameDecoder {
    /// Creates a decoder leasing bodies from `pool`.
    #[must_use]
    pub fn new(limit: ProtocolVersionLimit, max_body: usize, pool: FramePool) -> Self {
        Self {
            limit,
            max_body,
            pool,
        }
    }

    /// Pool bodies are leased from.
    #[must_use]
    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    /// Reads the next frame, returning `None` on a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`]; check [`CodecError::is_fatal`] to decide
    /// whether further frames can be read.
    pub fn read_frame<R: Read>(&self, reader: &mut R) -> Result<Option<Frame>, CodecError> {
        let Some(raw_version) = read_first_byte(reader)? else {
            return Ok(None);
        };
        let number = raw_version & VERSION_MASK;
        let tail_len = if number >= WIDE_STREAM_FROM { 8 } else { 7 };
        let mut tail = [0_u8; MAX_HEADER_TAIL];
        let tail_slice = tail.get_mut(..tail_len).unwrap_or_default();
        fill(reader, tail_slice, 1, 1 + tail_len)?;

        let mut cursor: &[u8] = tail_slice;
        let flags = FrameFlags::from_bits(cursor.get_u8());
        let stream_id = if number >= WIDE_STREAM_FROM {
            StreamId::new(cursor.get_i16())
        } else {
            StreamId::new(i16::from(cursor.get_i8()))
        };
        let opcode = cursor.get_u8();
        let length = usize::try_from(cursor.get_u32()).unwrap_or(usize::MAX);

        if raw_version & DIRECTION_BIT != 0 {
            return Err(CodecError::ResponseDirection { stream_id });
        }
        let version = ProtocolVersion::from_number(number)
            .filter(|version| self.limit.permits(*version))
            .ok_or_else(|| CodecError::UnsupportedVersion {
                version: number,
                supported: self.limit.describe(),
                stream_id,
            })?;

        if length > self.max_body {
            skip(reader, length)?;
            return Err(CodecError::FrameTooLarge {
                length,
                limit: self.max_body,
                stream_id,
            });
        }
        let mut body = self.pool.lease(length);
        fill(reader, body.as_mut_slice(), 0, length)?;

        let kind = MessageKind::from_opcode(opcode)
            .ok_or(CodecError::UnknownOpcode { opcode, stream_id })?;
        if !kind.is_request() {
            return Err(CodecError::NotARequest { kind, stream_id });
        }

        Ok(Some(Frame {
            header: FrameHeader {
                version,
                flags,
                stream_id,
                kind,
            },
            body,
        }))
    }
}

/// Writes frames in one direction.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    direction: Direction,
}

impl FrameEncoder {
    /// Encoder for server responses.
    #[must_use]
    pub const fn responses() -> Self {
        Self {
            direction: Direction::Response,
        }
    }

    /// Encoder for client requests.
    #[must_use]
    pub const fn requests() -> Self {
        Self {
            direction: Direction::Request,
        }
    }

    /// Appends one frame to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedBody`] when the body is too large for
    /// the length field or the stream id does not fit a narrow header.
    pub fn encode(
        &self,
        header: &FrameHeader,
        body: &[u8],
        out: &mut BytesMut,
    ) -> Result<(), CodecError> {
        let length = u32::try_from(body.len())
            .map_err(|_| CodecError::malformed(header.kind, "body exceeds u32 length"))?;
        let direction = match self.direction {
            Direction::Request => 0,
            Direction::Response => DIRECTION_BIT,
        };
        let narrow_stream = if header.version.stream_id_width() == 2 {
            None
        } else {
            let stream = i8::try_from(header.stream_id.get()).map_err(|_| {
                CodecError::malformed(
                    header.kind,
                    format!(
                        "stream {} does not fit a protocol v{} header",
                        header.stream_id,
                        header.version.number()
                    ),
                )
            })?;
            Some(stream)
        };
        out.reserve(header.version.header_len() + body.len());
        out.put_u8(header.version.number() | direction);
        out.put_u8(header.flags.bits());
        match narrow_stream {
            Some(stream) => out.put_i8(stream),
            None => out.put_i16(header.stream_id.get()),
        }
        out.put_u8(header.kind.opcode());
        out.put_u32(length);
        out.put_slice(body);
        Ok(())
    }

    /// Encodes one frame and writes it to `writer`.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when encoding or writing fails.
    pub fn write_frame<W: Write>(
        &self,
        writer: &mut W,
        header: &FrameHeader,
        body: &[u8],
    ) -> Result<(), CodecError> {
        let mut out = BytesMut::new();
        self.encode(header, body, &mut out)?;
        writer.write_all(&out)?;
        writer.flush()?;
        Ok(())
    }
}

fn read_first_byte<R: Read>(reader: &mut R) -> Result<Option<u8>, CodecError> {
    let mut byte = [0_u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => {
                let [value] = byte;
                return Ok(Some(value));
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(error) => return Err(error.into()),
        }
    }
}

fn fill<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    offset: usize,
    expected: usize,
) -> Result<(), CodecError> {
    let mut filled = 0;
    while filled < buf.len() {
        let remaining = buf.get_mut(filled..).unwrap_or_default();
        match reader.read(remaining) {
            Ok(0) => {
                return Err(CodecError::Truncated {
                    read: offset + filled,
                    expected,
                });
            }
            Ok(read) => filled += read,
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(error) => return Err(error.into()),
        }
    }
    Ok(())
}

fn skip<R: Read>(reader: &mut R, length: usize) -> Result<(), CodecError> {
    let wanted = u64::try_from(length).unwrap_or(u64::MAX);
    let skipped = io::copy(&mut reader.take(wanted), &mut io::sink())?;
    if skipped < wanted {
        return Err(CodecError::Truncated {
            read: usize::try_from(skipped).unwrap_or(usize::MAX),
            expected: length,
        });
    }
    Ok(())
}
