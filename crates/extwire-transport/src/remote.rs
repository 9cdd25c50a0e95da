use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::{debug, info};

use crate::duplex::Duplex;
use crate::error::{Result, TransportError};

/// Connect to a remote host for a helper started with `--connect`.
///
/// `addr` is either `host:port` (TCP) or a filesystem path to a Unix domain
/// socket. Anything containing a `/` is treated as a path.
pub fn connect(addr: &str) -> Result<Duplex> {
    match classify(addr)? {
        Remote::Unix(path) => {
            let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
                addr: addr.to_string(),
                source: e,
            })?;
            info!(addr, "connected to unix socket");
            Ok(Duplex::from_unix_stream(stream))
        }
        Remote::Tcp(host_port) => {
            let stream = TcpStream::connect(host_port).map_err(|e| TransportError::Connect {
                addr: addr.to_string(),
                source: e,
            })?;
            if let Err(err) = stream.set_nodelay(true) {
                debug!(addr, error = %err, "failed to disable nagle");
            }
            info!(addr, "connected to tcp endpoint");
            Ok(Duplex::from_tcp_stream(stream))
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Remote<'a> {
    Unix(&'a Path),
    Tcp(&'a str),
}

fn classify(addr: &str) -> Result<Remote<'_>> {
    if addr.contains('/') {
        return Ok(Remote::Unix(Path::new(addr)));
    }

    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(Remote::Tcp(addr))
        }
        _ => Err(TransportError::InvalidAddress(addr.to_string())),
    }
}
