//! Checksummed packet framing for the extwire helper protocol.
//!
//! Every command travels as a packet with:
//! - a 4-byte big-endian signature (0xDECAFBAD)
//! - a 4-byte big-endian checksum of the payload
//! - a 4-byte big-endian payload length
//! - a protobuf [`Envelope`] carrying `(command, seqno, content)`
//!
//! Decoding never resynchronizes: a bad signature or checksum is fatal for
//! the stream it came from.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod checksum;
pub mod codec;
pub mod commands;
pub mod envelope;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::PacketCodec;
pub use checksum::checksum;
pub use codec::{
    decode_packet, encode_command, encode_packet, FrameConfig, PacketHeader, DEFAULT_MAX_PAYLOAD,
    HEADER_SIZE, MAGIC,
};
pub use envelope::Envelope;
pub use error::{FrameError, Result};
pub use reader::PacketReader;
pub use writer::PacketWriter;
