use std::io::{ErrorKind, Read, Write};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use extwire_frame::{decode_packet, DEFAULT_MAX_PAYLOAD};
use extwire_transport::{Duplex, TransportError};
use tracing::{debug, error, info, trace, warn};

use crate::datasource::DatasourceCapabilities;
use crate::error::{PeerError, Result};
use crate::handle::Handle;
use crate::keepalive::DEFAULT_KEEPALIVE_TIMEOUT;
use crate::registry::{CommandHandler, CommandRegistry};

/// Tunables for the helper I/O loop.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Longest single wait for transport readiness. Bounds how quickly a
    /// kill request or keepalive expiry is noticed.
    pub poll_timeout: Duration,
    /// Bytes requested per read from the transport.
    pub read_chunk_size: usize,
    /// Largest inbound packet payload accepted.
    pub max_payload_size: usize,
    /// How long queued output may take to flush once the loop stops.
    pub drain_timeout: Duration,
    /// Window within which a PONG must follow the first PING.
    pub keepalive_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            read_chunk_size: 4096,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            drain_timeout: Duration::from_secs(1),
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
        }
    }
}

/// Lifecycle of a helper connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Constructed; the loop has not started.
    Ready,
    Running,
    /// Stop requested; flushing queued output, no longer reading.
    Draining,
    /// Stopped cleanly.
    Closed,
    /// Stopped on a transport, framing, liveness or handler error.
    Failed,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// The helper side of a host connection: owns the transport, the inbound
/// buffer and the command registry, and runs the I/O loop.
pub struct DuplexChannel {
    duplex: Duplex,
    handle: Handle,
    registry: CommandRegistry,
    config: ChannelConfig,
    read_buf: BytesMut,
    chunk: Vec<u8>,
}

impl DuplexChannel {
    /// Wrap `duplex` with default configuration, switching it to
    /// non-blocking mode.
    pub fn new(duplex: Duplex) -> Result<Self> {
        Self::with_config(duplex, ChannelConfig::default())
    }

    pub fn with_config(duplex: Duplex, config: ChannelConfig) -> Result<Self> {
        duplex.set_nonblocking()?;
        debug!(transport = duplex.transport_name(), ?config, "helper channel created");
        Ok(Self {
            duplex,
            handle: Handle::new(config.keepalive_timeout),
            registry: CommandRegistry::new(),
            chunk: vec![0u8; config.read_chunk_size.max(1)],
            read_buf: BytesMut::new(),
            config,
        })
    }

    /// Handle for sending and controlling the connection from any thread.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Register a custom command handler. See [`CommandRegistry::register`].
    pub fn add_handler<H>(&mut self, command: &str, handler: H) -> bool
    where
        H: CommandHandler + 'static,
    {
        self.registry.register(command, handler)
    }

    pub fn set_capabilities(&mut self, capabilities: DatasourceCapabilities) {
        self.registry.set_capabilities(capabilities);
    }

    /// Run the I/O loop on the current thread until the connection stops.
    ///
    /// Returns `Ok(())` after a requested stop (SHUTDOWN from the host or
    /// [`Handle::kill`]) once queued output is flushed. Any other exit is an
    /// error, and the state is left [`ChannelState::Failed`].
    pub fn run(mut self) -> Result<()> {
        let _guard = StateGuard(self.handle.clone());
        self.handle.set_state(ChannelState::Running);
        info!(transport = self.duplex.transport_name(), "I/O loop started");

        let result = self.io_loop();
        match &result {
            Ok(()) => {
                self.handle.set_state(ChannelState::Closed);
                info!("I/O loop closed");
            }
            Err(err) => {
                self.handle.set_state(ChannelState::Failed);
                error!(error = %err, "I/O loop failed");
            }
        }
        result
    }

    /// Run the I/O loop on a dedicated thread.
    pub fn spawn(self) -> Result<ChannelThread> {
        let handle = self.handle();
        let thread = thread::Builder::new()
            .name("extwire-io".into())
            .spawn(move || self.run())
            .map_err(TransportError::from)?;
        Ok(ChannelThread { handle, thread })
    }

    fn io_loop(&mut self) -> Result<()> {
        loop {
            let want_write = {
                let conn = self.handle.lock();
                if conn.stopping {
                    None
                } else {
                    conn.keepalive.check(Instant::now())?;
                    Some(!conn.write_buf.is_empty())
                }
            };
            let Some(want_write) = want_write else {
                return self.drain();
            };

            let ready = self
                .duplex
                .poll(true, want_write, self.config.poll_timeout)?;
            if ready.exceptional {
                return Err(PeerError::Exceptional);
            }
            if ready.writable {
                self.flush_once()?;
            }
            if ready.readable {
                self.read_once()?;
            }
        }
    }

    /// One non-blocking write of as much queued output as the transport
    /// accepts. Written bytes leave the front of the buffer.
    fn flush_once(&mut self) -> Result<()> {
        let mut conn = self.handle.lock();
        if conn.write_buf.is_empty() {
            return Ok(());
        }
        match self.duplex.write(&conn.write_buf) {
            Ok(0) => Err(PeerError::Closed("host stopped accepting output".into())),
            Ok(n) => {
                conn.write_buf.advance(n);
                trace!(written = n, remaining = conn.write_buf.len(), "flushed output");
                Ok(())
            }
            Err(err) if is_transient(&err) => Ok(()),
            Err(err) => Err(TransportError::from(err).into()),
        }
    }

    /// One non-blocking read, then dispatch every complete packet now
    /// buffered, in arrival order.
    fn read_once(&mut self) -> Result<()> {
        match self.duplex.read(&mut self.chunk) {
            Ok(0) => return Err(PeerError::Closed("host closed input".into())),
            Ok(n) => {
                self.read_buf.extend_from_slice(&self.chunk[..n]);
                trace!(read = n, buffered = self.read_buf.len(), "read input");
            }
            Err(err) if is_transient(&err) => return Ok(()),
            Err(err) => return Err(TransportError::from(err).into()),
        }

        while let Some(envelope) = decode_packet(&mut self.read_buf, self.config.max_payload_size)? {
            self.registry.dispatch(&self.handle, envelope)?;
        }
        Ok(())
    }

    /// Flush queued output until empty, the drain timeout passes, or the
    /// host hangs up. Nothing more is read.
    fn drain(&mut self) -> Result<()> {
        self.handle.set_state(ChannelState::Draining);
        let deadline = Instant::now() + self.config.drain_timeout;
        debug!(pending = self.handle.pending_bytes(), "draining output");

        loop {
            let pending = self.handle.pending_bytes();
            if pending == 0 {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(pending, "drain timed out, dropping unsent output");
                return Ok(());
            }

            let ready = self.duplex.poll(false, true, deadline - now)?;
            if ready.exceptional {
                return Err(PeerError::Exceptional);
            }
            if ready.writable {
                self.flush_once()?;
            } else if ready.hangup {
                warn!(pending, "host hung up while draining, dropping unsent output");
                return Ok(());
            }
        }
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// Leaves the state `Failed` if the loop unwinds without recording an
/// outcome.
struct StateGuard(Handle);

impl Drop for StateGuard {
    fn drop(&mut self) {
        let mut conn = self.0.lock();
        if !conn.state.is_terminal() {
            conn.state = ChannelState::Failed;
        }
    }
}

/// A [`DuplexChannel`] running on its own thread.
pub struct ChannelThread {
    handle: Handle,
    thread: JoinHandle<Result<()>>,
}

impl ChannelThread {
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the loop to stop and return its outcome.
    pub fn join(self) -> Result<()> {
        self.thread.join().map_err(|_| PeerError::LoopPanicked)?
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use extwire_frame::{commands, encode_command, Envelope, FrameError, PacketReader, PacketWriter};
    use prost::Message;

    use super::*;
    use crate::datasource::{ProbeSource, ProbeSourceReport};
    use crate::messages::{HttpAuthToken, HttpRegisterUri, HttpRequest, HttpResponse, Ping, Pong, Shutdown};

    struct Host {
        reader: PacketReader<UnixStream>,
        writer: PacketWriter<UnixStream>,
    }

    impl Host {
        fn send(&mut self, command: &str, seqno: u64, payload: &impl Message) {
            self.writer
                .send(command, seqno, &payload.encode_to_vec())
                .unwrap();
        }

        fn recv(&mut self) -> Envelope {
            self.reader.read_envelope().unwrap()
        }

        fn shutdown(&mut self) {
            self.send(commands::SHUTDOWN, 999, &Shutdown::default());
        }
    }

    fn fast_config() -> ChannelConfig {
        ChannelConfig {
            poll_timeout: Duration::from_millis(20),
            ..ChannelConfig::default()
        }
    }

    fn pair_with(config: ChannelConfig) -> (DuplexChannel, Host) {
        let (helper, host) = UnixStream::pair().unwrap();
        host.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let channel = DuplexChannel::with_config(Duplex::from_unix_stream(helper), config).unwrap();
        let host = Host {
            reader: PacketReader::new(host.try_clone().unwrap()),
            writer: PacketWriter::new(host),
        };
        (channel, host)
    }

    fn pair() -> (DuplexChannel, Host) {
        pair_with(fast_config())
    }

    #[test]
    fn ping_answered_then_shutdown_closes() {
        let (channel, mut host) = pair();
        let running = channel.spawn().unwrap();

        host.send(commands::PING, 7, &Ping {});
        let pong = host.recv();
        assert_eq!(pong.command, commands::PONG);
        assert_eq!(Pong::decode(pong.content).unwrap().ping_seqno, 7);

        host.shutdown();
        let handle = running.handle().clone();
        running.join().unwrap();
        assert_eq!(handle.state(), ChannelState::Closed);
        assert!(!handle.is_running());
    }

    #[test]
    fn every_packet_in_one_read_is_dispatched() {
        let (mut channel, mut host) = pair();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        channel.add_handler("RECORD", move |_: &Handle, seqno: u64, content: Bytes| -> Result<()> {
            log.lock().unwrap().push((seqno, content.len()));
            Ok(())
        });
        let running = channel.spawn().unwrap();

        let mut burst = Vec::new();
        for seqno in 1..=3u64 {
            burst.extend_from_slice(&encode_command("RECORD", seqno, vec![0u8; seqno as usize]).unwrap());
        }
        burst.extend_from_slice(&encode_command(commands::SHUTDOWN, 4, Bytes::new()).unwrap());
        host.writer.get_mut().write_all(&burst).unwrap();

        running.join().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn unknown_commands_do_not_stop_the_loop() {
        let (channel, mut host) = pair();
        let running = channel.spawn().unwrap();

        host.writer.send("NOT_A_COMMAND", 1, b"junk").unwrap();
        host.send(commands::PING, 2, &Ping {});
        assert_eq!(host.recv().command, commands::PONG);

        host.shutdown();
        running.join().unwrap();
    }

    #[test]
    fn output_queued_before_start_is_flushed() {
        let (channel, mut host) = pair();
        let handle = channel.handle();
        handle.send_bytes("HELLO", Bytes::from_static(b"x")).unwrap();
        let running = channel.spawn().unwrap();

        let env = host.recv();
        assert_eq!((env.command.as_str(), env.seqno), ("HELLO", 0));

        handle.kill();
        running.join().unwrap();
        assert_eq!(handle.state(), ChannelState::Closed);
    }

    #[test]
    fn kill_flushes_queued_output() {
        let (channel, mut host) = pair();
        let handle = channel.handle();
        let running = channel.spawn().unwrap();

        for _ in 0..20 {
            handle.send_bytes("BULK", vec![1u8; 2000]).unwrap();
        }
        handle.kill();

        for _ in 0..20 {
            assert_eq!(host.recv().content.len(), 2000);
        }
        running.join().unwrap();
        assert_eq!(handle.pending_bytes(), 0);
    }

    #[test]
    fn corrupted_checksum_fails_the_loop() {
        let (channel, mut host) = pair();
        let handle = channel.handle();
        let running = channel.spawn().unwrap();

        let mut packet = encode_command(commands::PING, 1, Bytes::new()).unwrap().to_vec();
        packet[4] ^= 0x01;
        host.writer.get_mut().write_all(&packet).unwrap();

        let err = running.join().unwrap_err();
        assert!(matches!(err, PeerError::Frame(FrameError::ChecksumMismatch { .. })));
        assert_eq!(handle.state(), ChannelState::Failed);
    }

    #[test]
    fn bad_magic_fails_the_loop() {
        let (channel, mut host) = pair();
        let running = channel.spawn().unwrap();

        host.writer.get_mut().write_all(&[0u8; 12]).unwrap();

        let err = running.join().unwrap_err();
        assert!(matches!(err, PeerError::Frame(FrameError::InvalidMagic { found: 0 })));
    }

    #[test]
    fn host_hangup_fails_the_loop() {
        let (channel, host) = pair();
        let handle = channel.handle();
        let running = channel.spawn().unwrap();

        drop(host);

        let err = running.join().unwrap_err();
        assert!(err.is_disconnect(), "unexpected error: {err}");
        assert_eq!(handle.state(), ChannelState::Failed);
    }

    #[test]
    fn missing_pong_times_out() {
        let (channel, _host) = pair_with(ChannelConfig {
            poll_timeout: Duration::from_millis(20),
            keepalive_timeout: Duration::from_millis(150),
            ..ChannelConfig::default()
        });
        let handle = channel.handle();
        handle.send_ping().unwrap();

        let started = Instant::now();
        let err = channel.spawn().unwrap().join().unwrap_err();

        assert!(matches!(err, PeerError::LivenessTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(handle.state(), ChannelState::Failed);
    }

    #[test]
    fn kill_after_missed_pong_still_closes() {
        let (channel, mut host) = pair_with(ChannelConfig {
            poll_timeout: Duration::from_millis(20),
            keepalive_timeout: Duration::from_millis(10),
            ..ChannelConfig::default()
        });
        let handle = channel.handle();
        handle.send_ping().unwrap();
        thread::sleep(Duration::from_millis(50));
        handle.kill();

        channel.run().unwrap();
        assert_eq!(handle.state(), ChannelState::Closed);
        assert_eq!(host.recv().command, commands::PING);
    }

    #[test]
    fn closed_host_reader_on_pipe_pair_fails_the_loop() {
        use std::os::fd::{FromRawFd, OwnedFd};

        fn pipe() -> (OwnedFd, OwnedFd) {
            let mut fds = [0 as libc::c_int; 2];
            // SAFETY: `fds` has room for the two descriptors pipe(2) writes.
            let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
            assert_eq!(rc, 0, "pipe should be creatable");
            // SAFETY: pipe(2) succeeded, so both descriptors are open and unowned.
            unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
        }

        let (helper_in, _host_out) = pipe();
        let (host_in, helper_out) = pipe();
        let channel =
            DuplexChannel::with_config(Duplex::from_fds(helper_in, helper_out), fast_config()).unwrap();
        let handle = channel.handle();
        drop(host_in);

        handle.send_bytes("BULK", vec![7u8; 64]).unwrap();
        let err = channel.run().unwrap_err();

        assert!(matches!(err, PeerError::Exceptional), "unexpected error: {err}");
        assert_eq!(handle.state(), ChannelState::Failed);
    }

    #[test]
    fn pongs_keep_the_connection_alive() {
        let (channel, mut host) = pair_with(ChannelConfig {
            poll_timeout: Duration::from_millis(20),
            keepalive_timeout: Duration::from_millis(300),
            ..ChannelConfig::default()
        });
        let handle = channel.handle();
        let running = channel.spawn().unwrap();

        for _ in 0..5 {
            handle.send_ping().unwrap();
            let ping = host.recv();
            assert_eq!(ping.command, commands::PING);
            host.send(commands::PONG, 0, &Pong { ping_seqno: ping.seqno });
            thread::sleep(Duration::from_millis(100));
        }
        assert!(handle.is_running());

        handle.kill();
        running.join().unwrap();
    }

    #[test]
    fn unregistered_uri_fails_the_loop() {
        let (channel, mut host) = pair();
        let running = channel.spawn().unwrap();

        host.send(
            commands::HTTPREQUEST,
            1,
            &HttpRequest {
                req_id: 1,
                uri: "/nope".into(),
                method: "GET".into(),
                variable_data: Vec::new(),
            },
        );

        let err = running.join().unwrap_err();
        assert!(matches!(err, PeerError::UnregisteredUri { .. }));
    }

    #[test]
    fn proxied_request_is_answered() {
        let (channel, mut host) = pair();
        let handle = channel.handle();
        handle
            .add_uri_handler("GET", "/demo/status.json", false, |ctx: &Handle, req: &HttpRequest| -> Result<()> {
                ctx.send_http_response(req.req_id, vec![b'{'; 1500], 200, false, true)
            })
            .unwrap();
        let running = channel.spawn().unwrap();

        let reg = host.recv();
        assert_eq!(reg.command, commands::HTTPREGISTERURI);
        assert_eq!(HttpRegisterUri::decode(reg.content).unwrap().uri, "/demo/status.json");

        host.send(
            commands::HTTPREQUEST,
            5,
            &HttpRequest {
                req_id: 77,
                uri: "/demo/status.json".into(),
                method: "GET".into(),
                variable_data: Vec::new(),
            },
        );

        let frames: Vec<HttpResponse> = (0..3)
            .map(|_| HttpResponse::decode(host.recv().content).unwrap())
            .collect();
        assert!(frames.iter().all(|f| f.req_id == 77));
        assert_eq!(frames[0].content.as_ref().unwrap().len(), 1024);
        assert_eq!(frames[1].content.as_ref().unwrap().len(), 476);
        assert!(frames[2].is_closing());

        host.shutdown();
        running.join().unwrap();
    }

    #[test]
    fn auth_token_reaches_callback() {
        let (channel, mut host) = pair();
        let handle = channel.handle();
        let (tx, rx) = std::sync::mpsc::channel();
        handle
            .request_http_auth_with(move |_, token| {
                let _ = tx.send(token.to_owned());
            })
            .unwrap();
        let running = channel.spawn().unwrap();

        assert_eq!(host.recv().command, commands::HTTPAUTHREQ);
        host.send(
            commands::HTTPAUTH,
            1,
            &HttpAuthToken {
                token: "tok".into(),
            },
        );

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "tok");
        assert_eq!(handle.auth_token().as_deref(), Some("tok"));

        host.shutdown();
        running.join().unwrap();
    }

    #[test]
    fn probe_without_capability_reports_failure() {
        let (channel, mut host) = pair();
        let running = channel.spawn().unwrap();

        host.send(
            commands::KDSPROBESOURCE,
            21,
            &ProbeSource {
                definition: "wlan0".into(),
            },
        );
        let env = host.recv();
        assert_eq!(env.command, commands::KDSPROBESOURCEREPORT);
        let report = ProbeSourceReport::decode(env.content).unwrap();
        assert_eq!(report.success.unwrap().seqno, Some(21));

        host.send(commands::PING, 22, &Ping {});
        assert_eq!(host.recv().command, commands::PONG);

        host.shutdown();
        running.join().unwrap();
    }

    #[test]
    fn panicking_handler_marks_failed() {
        let (mut channel, mut host) = pair();
        channel.add_handler("BOOM", |_: &Handle, _: u64, _: Bytes| -> Result<()> {
            panic!("handler blew up")
        });
        let handle = channel.handle();
        let running = channel.spawn().unwrap();

        host.writer.send("BOOM", 1, b"").unwrap();

        assert!(matches!(running.join(), Err(PeerError::LoopPanicked)));
        assert_eq!(handle.state(), ChannelState::Failed);
    }

    #[test]
    fn config_defaults() {
        let cfg = ChannelConfig::default();
        assert_eq!(cfg.poll_timeout, Duration::from_secs(1));
        assert_eq!(cfg.read_chunk_size, 4096);
        assert_eq!(cfg.keepalive_timeout, Duration::from_secs(5));
        assert_eq!(cfg.max_payload_size, DEFAULT_MAX_PAYLOAD);
    }
}
