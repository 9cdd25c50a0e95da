//! Duplex byte-stream transport for extwire helpers.
//!
//! A helper talks to its host over either:
//! - a pair of inherited pipe descriptors (`--in-fd` / `--out-fd`)
//! - a single connected Unix domain or TCP socket
//!
//! This is the lowest layer of extwire. The I/O loop in `extwire-peer`
//! only ever sees the [`Duplex`] type provided here.

pub mod error;

#[cfg(unix)]
pub mod duplex;
#[cfg(unix)]
pub mod remote;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use duplex::{Duplex, Readiness};
#[cfg(unix)]
pub use remote::connect;
