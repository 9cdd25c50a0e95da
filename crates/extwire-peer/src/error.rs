use std::time::Duration;

/// Errors that terminate or reject work on a helper connection.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] extwire_transport::TransportError),

    /// Framing error: bad magic, checksum mismatch, oversized or undecodable packet.
    #[error("frame error: {0}")]
    Frame(#[from] extwire_frame::FrameError),

    /// The host closed its end of the connection.
    #[error("connection closed: {0}")]
    Closed(String),

    /// The transport reported an error condition on one of its descriptors.
    #[error("exceptional condition on transport")]
    Exceptional,

    /// No PONG arrived within the keepalive window.
    #[error("no pong received for {elapsed:?}")]
    LivenessTimeout { elapsed: Duration },

    /// The host forwarded a request for a URI nobody registered.
    #[error("no handler registered for {method} {uri}")]
    UnregisteredUri { method: String, uri: String },

    /// A command payload did not decode as its expected message.
    #[error("malformed {command} payload: {source}")]
    Payload {
        command: String,
        #[source]
        source: prost::DecodeError,
    },

    /// A registered handler refused the command.
    #[error("{command} handler failed: {message}")]
    Handler { command: String, message: String },

    /// The I/O thread panicked before reporting a result.
    #[error("I/O loop panicked")]
    LoopPanicked,
}

impl PeerError {
    /// Build a [`PeerError::Handler`] from inside a command or URI handler.
    pub fn handler(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Whether the error means the host went away rather than misbehaved.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Closed(_) | Self::Exceptional)
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
