use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use tracing::trace;

use crate::checksum::checksum;
use crate::envelope::Envelope;
use crate::error::{FrameError, Result};

/// Packet header: magic (4) + checksum (4) + length (4) = 12 bytes.
pub const HEADER_SIZE: usize = 12;

/// Packet signature.
pub const MAGIC: u32 = 0xDECA_FBAD;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A parsed packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet signature, 0xDECAFBAD on a valid stream.
    pub magic: u32,
    /// Checksum of the payload bytes.
    pub checksum: u32,
    /// Payload length in bytes.
    pub length: u32,
}

impl PacketHeader {
    /// Parse a header from the front of `src`.
    ///
    /// Returns `None` if fewer than [`HEADER_SIZE`] bytes are available. The
    /// magic is not validated here.
    pub fn parse(src: &[u8]) -> Option<Self> {
        let mut header = src.get(..HEADER_SIZE)?;
        Some(Self {
            magic: header.get_u32(),
            checksum: header.get_u32(),
            length: header.get_u32(),
        })
    }

    /// Total wire size of the packet this header announces.
    pub fn packet_len(&self) -> usize {
        HEADER_SIZE + self.length as usize
    }
}

/// Encode an envelope into the wire format.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌──────────────┬──────────────┬──────────────┬───────────────────────┐
/// │ Magic (4B)   │ Checksum (4B)│ Length (4B)  │ Envelope (Length B)   │
/// │ 0xDECAFBAD   │ of envelope  │              │ protobuf Command      │
/// └──────────────┴──────────────┴──────────────┴───────────────────────┘
/// ```
///
/// Fails only when the serialized envelope does not fit a 32-bit length.
pub fn encode_packet(envelope: &Envelope, dst: &mut BytesMut) -> Result<()> {
    let payload = envelope.encode_to_vec();
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }

    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32(MAGIC);
    dst.put_u32(checksum(&payload));
    dst.put_u32(payload.len() as u32);
    dst.put_slice(&payload);
    Ok(())
}

/// Encode a `(command, seqno, content)` triple into a standalone packet.
pub fn encode_command(command: &str, seqno: u64, content: impl Into<Bytes>) -> Result<Bytes> {
    let envelope = Envelope::new(command, seqno, content);
    let mut dst = BytesMut::new();
    encode_packet(&envelope, &mut dst)?;
    Ok(dst.freeze())
}

/// Decode one packet from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete packet yet; in
/// that case nothing is consumed and the header is re-parsed next time. On
/// success, consumes `HEADER_SIZE + length` bytes from the buffer.
///
/// A bad signature, oversized length, checksum mismatch or undecodable
/// envelope is an error and leaves the buffer untouched. Callers must treat
/// every error as fatal for the stream.
pub fn decode_packet(src: &mut BytesMut, max_payload: usize) -> Result<Option<Envelope>> {
    let Some(header) = PacketHeader::parse(&src[..]) else {
        return Ok(None); // Need more data
    };

    if header.magic != MAGIC {
        return Err(FrameError::InvalidMagic {
            found: header.magic,
        });
    }

    let length = header.length as usize;
    if length > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: length,
            max: max_payload,
        });
    }

    if src.len() < header.packet_len() {
        return Ok(None); // Need more data
    }

    let payload = &src[HEADER_SIZE..header.packet_len()];
    let computed = checksum(payload);
    if computed != header.checksum {
        return Err(FrameError::ChecksumMismatch {
            expected: header.checksum,
            computed,
        });
    }

    let envelope = Envelope::decode(payload)?;
    src.advance(header.packet_len());

    trace!(
        command = %envelope.command,
        seqno = envelope.seqno,
        bytes = header.packet_len(),
        "decoded packet"
    );
    Ok(Some(envelope))
}

/// Configuration shared by the packet reader, writer and codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
