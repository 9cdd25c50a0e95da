/// Errors that can occur during packet encoding/decoding.
///
/// Every decoding error is fatal for the stream: once a header or checksum
/// fails to validate, the byte offset can no longer be trusted.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The packet header does not start with 0xDECAFBAD.
    #[error("invalid packet signature 0x{found:08X} (expected 0xDECAFBAD)")]
    InvalidMagic { found: u32 },

    /// The payload checksum does not match the header.
    #[error("invalid checksum in packet header: computed 0x{computed:08X}, header 0x{expected:08X}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload passed the checksum but is not a valid command envelope.
    #[error("malformed command envelope: {0}")]
    Envelope(#[from] prost::DecodeError),

    /// An I/O error occurred while reading or writing packets.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete packet was received.
    #[error("connection closed (incomplete packet)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
