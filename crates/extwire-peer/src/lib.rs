//! Helper side of the external helper protocol.
//!
//! A [`DuplexChannel`] owns the transport to the host and runs a
//! single-threaded, non-blocking I/O loop: it reads and dispatches inbound
//! commands through a [`CommandRegistry`], answers the built-in commands,
//! enforces keepalive once pinging starts, and flushes output queued through
//! cloneable [`Handle`]s from any thread.

pub mod channel;
pub mod datasource;
pub mod error;
pub mod handle;
pub mod http;
pub mod keepalive;
pub mod messages;
pub mod registry;

pub use channel::{ChannelConfig, ChannelState, ChannelThread, DuplexChannel};
pub use datasource::DatasourceCapabilities;
pub use error::{PeerError, Result};
pub use handle::Handle;
pub use http::{response_frames, UriHandler, UriRegistry, HTTP_CHUNK_SIZE};
pub use keepalive::{KeepaliveSupervisor, DEFAULT_KEEPALIVE_TIMEOUT};
pub use messages::MessageType;
pub use registry::{CommandHandler, CommandRegistry, Dispatch, Handler};
