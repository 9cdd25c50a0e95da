use std::fmt;
use std::io;

use extwire_frame::FrameError;
use extwire_peer::PeerError;
use extwire_transport::TransportError;

// Exit code constants aligned with sysexits-style CLI semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::InvalidAddress(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::LivenessTimeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::Payload { .. } | PeerError::UnregisteredUri { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PeerError::Closed(_) | PeerError::Exceptional | PeerError::Handler { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn liveness_timeout_maps_to_timeout() {
        let err = peer_error(
            "serve",
            PeerError::LivenessTimeout {
                elapsed: Duration::from_secs(6),
            },
        );
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("serve: "));
    }

    #[test]
    fn framing_errors_are_data_invalid() {
        let err = peer_error(
            "serve",
            PeerError::Frame(FrameError::ChecksumMismatch {
                expected: 1,
                computed: 2,
            }),
        );
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn host_hangup_is_plain_failure() {
        let err = peer_error("serve", PeerError::Closed("host closed input".into()));
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn bad_address_is_usage() {
        let err = transport_error("connect", TransportError::InvalidAddress("nope".into()));
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn permission_denied_io() {
        let err = io_error("open", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.code, PERMISSION_DENIED);
    }
}
