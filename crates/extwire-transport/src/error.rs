use std::os::fd::RawFd;

/// Errors that can occur while acquiring or driving a duplex transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the remote endpoint.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// A descriptor handed to the transport is not open.
    #[error("invalid file descriptor {fd}: {source}")]
    InvalidDescriptor { fd: RawFd, source: std::io::Error },

    /// The remote address could not be parsed.
    #[error("invalid remote address {0:?} (expected host:port or a socket path)")]
    InvalidAddress(String),

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
