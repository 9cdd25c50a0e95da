use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

/// Readiness reported by a single [`Duplex::poll`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Input has bytes (or end-of-stream) waiting.
    pub readable: bool,
    /// Output accepts more bytes. Only reported when writability was requested.
    pub writable: bool,
    /// Either descriptor is in an error or invalid state.
    pub exceptional: bool,
    /// The peer hung up on the output descriptor; nothing more can be
    /// delivered.
    pub hangup: bool,
}

/// A bidirectional byte stream to the host: reads come from the input side,
/// writes go to the output side.
///
/// Pipe pairs keep two distinct descriptors; sockets use one descriptor for
/// both directions.
pub struct Duplex {
    inner: DuplexInner,
}

enum DuplexInner {
    Pipes { input: File, output: File },
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Duplex {
    /// Build a duplex from two owned descriptors (input, output).
    pub fn from_fds(input: OwnedFd, output: OwnedFd) -> Self {
        Self {
            inner: DuplexInner::Pipes {
                input: File::from(input),
                output: File::from(output),
            },
        }
    }

    /// Take ownership of two inherited raw descriptors, typically passed by
    /// the host as `--in-fd` and `--out-fd`.
    ///
    /// Passing the same descriptor twice is allowed (a socket handed over as
    /// both ends); it is duplicated so each side owns its own handle.
    ///
    /// # Safety
    ///
    /// Both descriptors must be open and not owned by anything else in this
    /// process. They are closed when the `Duplex` is dropped.
    pub unsafe fn from_raw_fds(input: RawFd, output: RawFd) -> Result<Self> {
        check_descriptor(input)?;
        check_descriptor(output)?;

        // SAFETY: the caller guarantees exclusive ownership of `input`, and
        // `check_descriptor` confirmed it is open.
        let input_file = unsafe { File::from_raw_fd(input) };
        let output_file = if output == input {
            input_file.try_clone()?
        } else {
            // SAFETY: as above, for `output`.
            unsafe { File::from_raw_fd(output) }
        };

        debug!(input, output, "adopted inherited descriptors");
        Ok(Self {
            inner: DuplexInner::Pipes {
                input: input_file,
                output: output_file,
            },
        })
    }

    /// Wrap a connected Unix domain socket.
    pub fn from_unix_stream(stream: UnixStream) -> Self {
        Self {
            inner: DuplexInner::Unix(stream),
        }
    }

    /// Wrap a connected TCP socket.
    pub fn from_tcp_stream(stream: TcpStream) -> Self {
        Self {
            inner: DuplexInner::Tcp(stream),
        }
    }

    /// Switch both directions to non-blocking mode.
    ///
    /// Must be called before handing the duplex to the I/O loop.
    pub fn set_nonblocking(&self) -> Result<()> {
        match &self.inner {
            DuplexInner::Pipes { input, output } => {
                set_fd_nonblocking(input.as_raw_fd())?;
                set_fd_nonblocking(output.as_raw_fd())?;
            }
            DuplexInner::Unix(stream) => stream.set_nonblocking(true)?,
            DuplexInner::Tcp(stream) => stream.set_nonblocking(true)?,
        }
        Ok(())
    }

    /// Descriptor reads are taken from.
    pub fn input_fd(&self) -> RawFd {
        match &self.inner {
            DuplexInner::Pipes { input, .. } => input.as_raw_fd(),
            DuplexInner::Unix(stream) => stream.as_raw_fd(),
            DuplexInner::Tcp(stream) => stream.as_raw_fd(),
        }
    }

    /// Descriptor writes go to.
    pub fn output_fd(&self) -> RawFd {
        match &self.inner {
            DuplexInner::Pipes { output, .. } => output.as_raw_fd(),
            DuplexInner::Unix(stream) => stream.as_raw_fd(),
            DuplexInner::Tcp(stream) => stream.as_raw_fd(),
        }
    }

    /// Wait up to `timeout` for the input to become readable (when
    /// `want_read` is set) and for the output to become writable (when
    /// `want_write` is set).
    ///
    /// Error and hang-up conditions are always reported. Hang-up on the input
    /// counts as readable (when reading) so the following read observes
    /// end-of-stream.
    /// A signal interrupting the wait yields an empty readiness rather than
    /// an error.
    pub fn poll(&self, want_read: bool, want_write: bool, timeout: Duration) -> Result<Readiness> {
        let input = self.input_fd();
        let output = self.output_fd();

        let read_events = if want_read { libc::POLLIN } else { 0 };
        let write_events = if want_write { libc::POLLOUT } else { 0 };
        let mut fds = [
            libc::pollfd {
                fd: input,
                events: read_events,
                revents: 0,
            },
            libc::pollfd {
                fd: output,
                events: write_events,
                revents: 0,
            },
        ];
        let nfds: usize = if input == output {
            fds[0].events |= write_events;
            1
        } else {
            2
        };

        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `fds` is a valid array of at least `nfds` pollfd entries and
        // both descriptors stay open for the lifetime of `self`.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), nfds as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                return Ok(Readiness::default());
            }
            return Err(err.into());
        }

        let mut readiness = Readiness::default();
        for pfd in &fds[..nfds] {
            if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
                readiness.exceptional = true;
            }
            if pfd.fd == output && pfd.revents & libc::POLLHUP != 0 {
                readiness.hangup = true;
            }
            if pfd.fd == input && want_read && pfd.revents & (libc::POLLIN | libc::POLLHUP) != 0 {
                readiness.readable = true;
            }
            if pfd.fd == output && want_write && pfd.revents & libc::POLLOUT != 0 {
                readiness.writable = true;
            }
        }
        Ok(readiness)
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            DuplexInner::Pipes { .. } => "pipe-pair",
            DuplexInner::Unix(_) => "unix-socket",
            DuplexInner::Tcp(_) => "tcp-socket",
        }
    }
}

impl Read for Duplex {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DuplexInner::Pipes { input, .. } => input.read(buf),
            DuplexInner::Unix(stream) => stream.read(buf),
            DuplexInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for Duplex {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DuplexInner::Pipes { output, .. } => output.write(buf),
            DuplexInner::Unix(stream) => stream.write(buf),
            DuplexInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            DuplexInner::Pipes { output, .. } => output.flush(),
            DuplexInner::Unix(stream) => stream.flush(),
            DuplexInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl std::fmt::Debug for Duplex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Duplex")
            .field("type", &self.transport_name())
            .field("input", &self.input_fd())
            .field("output", &self.output_fd())
            .finish()
    }
}

fn check_descriptor(fd: RawFd) -> Result<()> {
    // SAFETY: F_GETFD only inspects descriptor flags; an invalid `fd` is
    // reported through the return value.
    let rc = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if rc < 0 {
        return Err(TransportError::InvalidDescriptor {
            fd,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

fn set_fd_nonblocking(fd: RawFd) -> Result<()> {
    // SAFETY: `fd` belongs to a live `File` owned by the duplex.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    // SAFETY: as above; only the O_NONBLOCK status flag is added.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}
