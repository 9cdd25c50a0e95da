//! Helper-side implementation of the external helper protocol.
//!
//! A helper process talks to its host over a pipe pair or a socket using
//! checksummed packets that wrap protobuf command envelopes. This crate
//! re-exports the layers:
//!
//! - [`transport`]: the duplex byte stream (inherited descriptors, Unix or
//!   TCP sockets) and readiness polling
//! - [`frame`]: packet framing, checksums, envelopes and blocking or async
//!   codecs
//! - [`peer`]: the I/O loop, command registry, keepalive, HTTP proxying and
//!   datasource reports (behind the `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use extwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use extwire_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use extwire_peer::*;
}
