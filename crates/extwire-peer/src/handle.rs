use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use extwire_frame::{commands, encode_packet, Envelope};
use prost::Message;
use tracing::{debug, info, trace};

use crate::channel::ChannelState;
use crate::error::Result;
use crate::http::{response_frames, UriHandler, UriRegistry, UriRoute};
use crate::keepalive::KeepaliveSupervisor;
use crate::messages::{
    HttpAuthTokenRequest, HttpRegisterUri, MessageType, MsgbusMessage, Ping, Pong,
};

type AuthCallback = Box<dyn FnOnce(&Handle, &str) + Send>;

/// State shared between the I/O loop and every [`Handle`].
///
/// The write buffer, keepalive, stop flag, loop state and sequence counter
/// move together under one mutex.
pub(crate) struct Connection {
    pub(crate) write_buf: BytesMut,
    pub(crate) keepalive: KeepaliveSupervisor,
    pub(crate) stopping: bool,
    pub(crate) state: ChannelState,
    next_seqno: u64,
}

impl Connection {
    fn enqueue(&mut self, command: &str, content: Bytes) -> Result<u64> {
        let seqno = self.next_seqno;
        encode_packet(&Envelope::new(command, seqno, content), &mut self.write_buf)?;
        self.next_seqno = self.next_seqno.wrapping_add(1);
        trace!(command, seqno, queued = self.write_buf.len(), "queued command");
        Ok(seqno)
    }
}

#[derive(Default)]
struct AuthState {
    token: Option<String>,
    pending: Option<AuthCallback>,
}

struct Shared {
    conn: Mutex<Connection>,
    uris: RwLock<UriRegistry>,
    auth: Mutex<AuthState>,
}

/// Cloneable handle to a helper connection.
///
/// Every send appends a complete packet to the outbound buffer under a
/// single lock, so packets from concurrent senders never interleave. The I/O
/// loop drains the buffer; sends never block on the transport.
#[derive(Clone)]
pub struct Handle {
    shared: Arc<Shared>,
}

impl Handle {
    pub(crate) fn new(keepalive_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                conn: Mutex::new(Connection {
                    write_buf: BytesMut::new(),
                    keepalive: KeepaliveSupervisor::new(keepalive_timeout),
                    stopping: false,
                    state: ChannelState::Ready,
                    next_seqno: 0,
                }),
                uris: RwLock::new(UriRegistry::new()),
                auth: Mutex::new(AuthState::default()),
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.shared
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_auth(&self) -> MutexGuard<'_, AuthState> {
        self.shared
            .auth
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: ChannelState) {
        self.lock().state = state;
    }

    /// Append pre-encoded packet bytes to the outbound buffer verbatim.
    pub fn send_raw(&self, packet: &[u8]) {
        self.lock().write_buf.extend_from_slice(packet);
    }

    /// Queue `command` with an already-serialized payload. Returns the
    /// sequence number assigned to it.
    pub fn send_bytes(&self, command: &str, content: impl Into<Bytes>) -> Result<u64> {
        self.lock().enqueue(command, content.into())
    }

    /// Queue `command` with `content` serialized as its payload.
    pub fn send_command(&self, command: &str, content: &impl Message) -> Result<u64> {
        self.send_bytes(command, content.encode_to_vec())
    }

    /// Queue a PING and start liveness supervision if it is not running yet.
    pub fn send_ping(&self) -> Result<u64> {
        let mut conn = self.lock();
        conn.keepalive.arm(Instant::now());
        conn.enqueue(commands::PING, Ping {}.encode_to_vec().into())
    }

    pub(crate) fn send_pong(&self, ping_seqno: u64) -> Result<u64> {
        self.send_command(commands::PONG, &Pong { ping_seqno })
    }

    pub(crate) fn record_pong(&self, now: Instant) {
        self.lock().keepalive.record_pong(now);
    }

    /// Queue a message for the host's message bus.
    pub fn send_message(&self, text: &str, kind: MessageType) -> Result<u64> {
        self.send_command(commands::MESSAGE, &MsgbusMessage::new(text, kind))
    }

    /// Ask the I/O loop to stop. Queued output is flushed before it exits.
    pub fn kill(&self) {
        let mut conn = self.lock();
        if !conn.stopping {
            conn.stopping = true;
            info!("stop requested");
        }
    }

    /// Current loop state.
    pub fn state(&self) -> ChannelState {
        self.lock().state
    }

    /// Whether the loop is running and no stop has been requested.
    pub fn is_running(&self) -> bool {
        let conn = self.lock();
        conn.state == ChannelState::Running && !conn.stopping
    }

    /// Bytes queued but not yet written to the transport.
    pub fn pending_bytes(&self) -> usize {
        self.lock().write_buf.len()
    }

    /// Serve `method uri` through the host's web server.
    ///
    /// Records the route locally (replacing any previous one for the same
    /// pair) and queues `HTTPREGISTERURI`.
    pub fn add_uri_handler<H>(
        &self,
        method: &str,
        uri: &str,
        auth_required: bool,
        handler: H,
    ) -> Result<u64>
    where
        H: UriHandler + 'static,
    {
        let replaced = self
            .shared
            .uris
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method, uri, auth_required, Arc::new(handler));
        debug!(method, uri, auth_required, replaced = replaced.is_some(), "registered URI");

        self.send_command(
            commands::HTTPREGISTERURI,
            &HttpRegisterUri {
                method: method.to_owned(),
                uri: uri.to_owned(),
                auth_required,
            },
        )
    }

    pub(crate) fn uri_route(&self, method: &str, uri: &str) -> Option<UriRoute> {
        self.shared
            .uris
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method, uri)
            .cloned()
    }

    /// Registered (method, URI) pairs, sorted.
    pub fn registered_uris(&self) -> Vec<(String, String)> {
        self.shared
            .uris
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .routes()
    }

    /// Ask the host for an HTTP session token. Drops any callback still
    /// waiting from an earlier `request_http_auth_with`.
    pub fn request_http_auth(&self) -> Result<u64> {
        self.lock_auth().pending = None;
        self.send_auth_request()
    }

    /// Ask the host for an HTTP session token and run `callback` once with
    /// it when it arrives. Replaces any callback still waiting.
    pub fn request_http_auth_with<F>(&self, callback: F) -> Result<u64>
    where
        F: FnOnce(&Handle, &str) + Send + 'static,
    {
        self.lock_auth().pending = Some(Box::new(callback));
        self.send_auth_request()
    }

    fn send_auth_request(&self) -> Result<u64> {
        self.send_command(commands::HTTPAUTHREQ, &HttpAuthTokenRequest {})
    }

    /// Most recent token granted by the host.
    pub fn auth_token(&self) -> Option<String> {
        self.lock_auth().token.clone()
    }

    pub(crate) fn deliver_auth_token(&self, token: String) {
        let callback = {
            let mut auth = self.lock_auth();
            auth.token = Some(token.clone());
            auth.pending.take()
        };
        debug!(token_len = token.len(), callback = callback.is_some(), "received HTTP auth token");
        if let Some(callback) = callback {
            callback(self, &token);
        }
    }

    /// Answer proxied request `req_id`.
    ///
    /// The body is split into 1024-byte `HTTPRESPONSE` frames, followed by a
    /// closing frame carrying `result_code` unless this is a non-final part
    /// of a stream (`stream` set, `finished` clear). All frames are queued
    /// under one lock so the response stays contiguous.
    pub fn send_http_response(
        &self,
        req_id: u32,
        body: impl Into<Bytes>,
        result_code: u32,
        stream: bool,
        finished: bool,
    ) -> Result<()> {
        let frames = response_frames(req_id, &body.into(), result_code, stream, finished);
        let mut conn = self.lock();
        for frame in &frames {
            conn.enqueue(commands::HTTPRESPONSE, frame.encode_to_vec().into())?;
        }
        debug!(req_id, frames = frames.len(), result_code, "queued HTTP response");
        Ok(())
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conn = self.lock();
        f.debug_struct("Handle")
            .field("state", &conn.state)
            .field("stopping", &conn.stopping)
            .field("pending", &conn.write_buf.len())
            .finish()
    }
}
