use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_packet, encode_packet, FrameConfig};
use crate::envelope::Envelope;
use crate::error::FrameError;

/// `tokio_util` codec for extwire packets.
///
/// Decoding errors are fatal: a `FramedRead` built on this codec ends after
/// yielding the first error.
#[derive(Debug, Clone, Default)]
pub struct PacketCodec {
    config: FrameConfig,
}

impl PacketCodec {
    /// Create a codec with an explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }
}

impl Decoder for PacketCodec {
    type Item = Envelope;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>, FrameError> {
        decode_packet(src, self.config.max_payload_size)
    }
}

impl Encoder<Envelope> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_packet(&item, dst)
    }
}
