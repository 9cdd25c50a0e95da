use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_packet, FrameConfig};
use crate::envelope::Envelope;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 4096;

/// Reads complete envelopes from any blocking `Read` stream.
///
/// Handles partial reads internally; callers always get whole packets. This
/// is the host-side and offline counterpart of the helper's non-blocking
/// I/O loop.
pub struct PacketReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> PacketReader<T> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete envelope (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached,
    /// whether or not a partial packet was buffered.
    pub fn read_envelope(&mut self) -> Result<Envelope> {
        loop {
            if let Some(envelope) = decode_packet(&mut self.buf, self.config.max_payload_size)? {
                return Ok(envelope);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Number of bytes read from the stream but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Iterator for PacketReader<T> {
    type Item = Result<Envelope>;

    /// Yields envelopes until a clean end-of-stream between packets.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_envelope() {
            Ok(envelope) => Some(Ok(envelope)),
            Err(FrameError::ConnectionClosed) if self.buf.is_empty() => None,
            Err(err) => Some(Err(err)),
        }
    }
}
