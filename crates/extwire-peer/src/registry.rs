use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use bytes::Bytes;
use extwire_frame::{commands, Envelope};
use prost::Message;
use tracing::{debug, info, warn};

use crate::datasource::{Configure, DatasourceCapabilities, ListInterfaces, OpenSource, ProbeSource};
use crate::error::{PeerError, Result};
use crate::handle::Handle;
use crate::messages::{HttpAuthToken, HttpRequest, Ping, Pong, Shutdown};

/// Handles one custom command. Runs on the I/O thread with the packet's
/// sequence number and undecoded payload.
pub trait CommandHandler: Send {
    fn handle(&mut self, ctx: &Handle, seqno: u64, content: Bytes) -> Result<()>;
}

impl<F> CommandHandler for F
where
    F: FnMut(&Handle, u64, Bytes) -> Result<()> + Send,
{
    fn handle(&mut self, ctx: &Handle, seqno: u64, content: Bytes) -> Result<()> {
        self(ctx, seqno, content)
    }
}

/// What a registered command name dispatches to.
pub enum Handler {
    Ping,
    Pong,
    Shutdown,
    HttpAuth,
    HttpRequest,
    Configure,
    ProbeSource,
    OpenSource,
    ListInterfaces,
    Custom(Box<dyn CommandHandler>),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::Ping => f.write_str("Ping"),
            Self::Pong => f.write_str("Pong"),
            Self::Shutdown => f.write_str("Shutdown"),
            Self::HttpAuth => f.write_str("HttpAuth"),
            Self::HttpRequest => f.write_str("HttpRequest"),
            Self::Configure => f.write_str("Configure"),
            Self::ProbeSource => f.write_str("ProbeSource"),
            Self::OpenSource => f.write_str("OpenSource"),
            Self::ListInterfaces => f.write_str("ListInterfaces"),
        }
    }
}

/// Outcome of dispatching one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// No handler is registered for the command; the packet was dropped.
    Unknown,
}

/// Maps command names to handlers.
///
/// Starts with the built-in and datasource commands registered. Owned by
/// the I/O loop once it starts, so it is configured before running.
#[derive(Debug)]
pub struct CommandRegistry {
    handlers: HashMap<String, Handler>,
    capabilities: DatasourceCapabilities,
}

impl CommandRegistry {
    pub fn new() -> Self {
        let handlers = [
            (commands::PING, Handler::Ping),
            (commands::PONG, Handler::Pong),
            (commands::SHUTDOWN, Handler::Shutdown),
            (commands::HTTPAUTH, Handler::HttpAuth),
            (commands::HTTPREQUEST, Handler::HttpRequest),
            (commands::KDSCONFIGURE, Handler::Configure),
            (commands::KDSPROBESOURCE, Handler::ProbeSource),
            (commands::KDSOPENSOURCE, Handler::OpenSource),
            (commands::KDSLISTINTERFACES, Handler::ListInterfaces),
        ]
        .into_iter()
        .map(|(name, handler)| (name.to_owned(), handler))
        .collect();

        Self {
            handlers,
            capabilities: DatasourceCapabilities::default(),
        }
    }

    /// Register `handler` for `command`, replacing built-ins of the same
    /// name. Returns true if a handler was replaced.
    pub fn register<H>(&mut self, command: &str, handler: H) -> bool
    where
        H: CommandHandler + 'static,
    {
        let replaced = self
            .handlers
            .insert(command.to_owned(), Handler::Custom(Box::new(handler)))
            .is_some();
        debug!(command, replaced, "registered command handler");
        replaced
    }

    /// Stop handling `command`; its packets are then ignored.
    pub fn remove(&mut self, command: &str) -> Option<Handler> {
        self.handlers.remove(command)
    }

    pub fn set_capabilities(&mut self, capabilities: DatasourceCapabilities) {
        self.capabilities = capabilities;
    }

    pub fn capabilities(&self) -> &DatasourceCapabilities {
        &self.capabilities
    }

    pub fn contains(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Route one envelope to its handler.
    ///
    /// Unknown commands are logged and dropped. Payload decode failures and
    /// handler errors are returned; the loop treats them as fatal.
    pub fn dispatch(&mut self, ctx: &Handle, envelope: Envelope) -> Result<Dispatch> {
        let Envelope {
            command,
            seqno,
            content,
        } = envelope;

        let Some(handler) = self.handlers.get_mut(&command) else {
            warn!(command = %command, seqno, "no handler for command, dropping");
            return Ok(Dispatch::Unknown);
        };
        debug!(command = %command, seqno, bytes = content.len(), "dispatching");

        match handler {
            Handler::Ping => {
                decode::<Ping>(&command, content)?;
                ctx.send_pong(seqno)?;
            }
            Handler::Pong => {
                let pong = decode::<Pong>(&command, content)?;
                debug!(ping_seqno = pong.ping_seqno, "pong");
                ctx.record_pong(Instant::now());
            }
            Handler::Shutdown => {
                let shutdown = decode::<Shutdown>(&command, content)?;
                info!(reason = shutdown.reason.as_deref().unwrap_or(""), "host requested shutdown");
                ctx.kill();
            }
            Handler::HttpAuth => {
                let auth = decode::<HttpAuthToken>(&command, content)?;
                ctx.deliver_auth_token(auth.token);
            }
            Handler::HttpRequest => {
                let request = decode::<HttpRequest>(&command, content)?;
                let route = ctx.uri_route(&request.method, &request.uri).ok_or_else(|| {
                    PeerError::UnregisteredUri {
                        method: request.method.clone(),
                        uri: request.uri.clone(),
                    }
                })?;
                debug!(req_id = request.req_id, method = %request.method, uri = %request.uri, "HTTP request");
                route.handler().handle(ctx, &request)?;
            }
            Handler::Configure => {
                let conf = decode::<Configure>(&command, content)?;
                self.capabilities.configure(ctx, seqno, conf)?;
            }
            Handler::ProbeSource => {
                let probe = decode::<ProbeSource>(&command, content)?;
                self.capabilities.probe_source(ctx, seqno, probe)?;
            }
            Handler::OpenSource => {
                let open = decode::<OpenSource>(&command, content)?;
                self.capabilities.open_source(ctx, seqno, open)?;
            }
            Handler::ListInterfaces => {
                decode::<ListInterfaces>(&command, content)?;
                self.capabilities.list_interfaces(ctx, seqno)?;
            }
            Handler::Custom(handler) => handler.handle(ctx, seqno, content)?,
        }
        Ok(Dispatch::Handled)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn decode<M: Message + Default>(command: &str, content: Bytes) -> Result<M> {
    M::decode(content).map_err(|source| PeerError::Payload {
        command: command.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::BytesMut;
    use extwire_frame::decode_packet;

    use super::*;
    use crate::channel::ChannelState;
    use crate::messages::HttpResponse;

    fn handle() -> Handle {
        Handle::new(Duration::from_secs(5))
    }

    fn sent(handle: &Handle) -> Vec<Envelope> {
        let mut buf: BytesMut = std::mem::take(&mut handle.lock().write_buf);
        let mut out = Vec::new();
        while let Some(env) = decode_packet(&mut buf, usize::MAX).unwrap() {
            out.push(env);
        }
        out
    }

    fn env(command: &str, seqno: u64, payload: &impl Message) -> Envelope {
        Envelope::new(command, seqno, payload.encode_to_vec())
    }

    #[test]
    fn builtins_are_registered() {
        let reg = CommandRegistry::new();
        for name in [
            commands::PING,
            commands::PONG,
            commands::SHUTDOWN,
            commands::HTTPAUTH,
            commands::HTTPREQUEST,
            commands::KDSCONFIGURE,
            commands::KDSPROBESOURCE,
            commands::KDSOPENSOURCE,
            commands::KDSLISTINTERFACES,
        ] {
            assert!(reg.contains(name), "{name} missing");
        }
        assert_eq!(reg.commands().len(), 9);
    }

    #[test]
    fn ping_answered_with_pong() {
        let h = handle();
        let mut reg = CommandRegistry::new();
        let outcome = reg.dispatch(&h, env(commands::PING, 42, &Ping {})).unwrap();

        assert_eq!(outcome, Dispatch::Handled);
        let out = sent(&h);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].command, commands::PONG);
        assert_eq!(Pong::decode(out[0].content.clone()).unwrap().ping_seqno, 42);
    }

    #[test]
    fn pong_refreshes_keepalive() {
        let h = handle();
        let mut reg = CommandRegistry::new();
        reg.dispatch(&h, env(commands::PONG, 1, &Pong { ping_seqno: 0 }))
            .unwrap();
        assert!(h.lock().keepalive.is_armed());
        assert!(sent(&h).is_empty());
    }

    #[test]
    fn shutdown_requests_stop() {
        let h = handle();
        h.set_state(ChannelState::Running);
        let mut reg = CommandRegistry::new();
        reg.dispatch(&h, env(commands::SHUTDOWN, 1, &Shutdown::default()))
            .unwrap();
        assert!(!h.is_running());
    }

    #[test]
    fn unknown_command_is_dropped() {
        let h = handle();
        let mut reg = CommandRegistry::new();
        let outcome = reg
            .dispatch(&h, Envelope::new("NOSUCHCOMMAND", 1, Bytes::new()))
            .unwrap();
        assert_eq!(outcome, Dispatch::Unknown);
        assert!(sent(&h).is_empty());
    }

    #[test]
    fn custom_handler_sees_seqno_and_raw_content() {
        let h = handle();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut reg = CommandRegistry::new();
        let log = Arc::clone(&seen);
        reg.register("CUSTOM", move |_: &Handle, seqno: u64, content: Bytes| -> Result<()> {
            log.lock().unwrap().push((seqno, content));
            Ok(())
        });

        reg.dispatch(&h, Envelope::new("CUSTOM", 7, "abc")).unwrap();
        reg.dispatch(&h, Envelope::new("CUSTOM", 8, "")).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(7, Bytes::from_static(b"abc")), (8, Bytes::new())]
        );
    }

    #[test]
    fn custom_handler_overrides_builtin() {
        let h = handle();
        let mut reg = CommandRegistry::new();
        let replaced = reg.register(commands::PING, |_: &Handle, _: u64, _: Bytes| -> Result<()> { Ok(()) });

        assert!(replaced);
        reg.dispatch(&h, env(commands::PING, 1, &Ping {})).unwrap();
        assert!(sent(&h).is_empty());
    }

    #[test]
    fn removed_builtin_is_unknown() {
        let h = handle();
        let mut reg = CommandRegistry::new();
        assert!(reg.remove(commands::PING).is_some());
        let outcome = reg.dispatch(&h, env(commands::PING, 1, &Ping {})).unwrap();
        assert_eq!(outcome, Dispatch::Unknown);
    }

    #[test]
    fn handler_error_propagates() {
        let h = handle();
        let mut reg = CommandRegistry::new();
        reg.register("FAIL", |_: &Handle, _: u64, _: Bytes| -> Result<()> {
            Err(PeerError::handler("FAIL", "refused"))
        });
        let err = reg.dispatch(&h, Envelope::new("FAIL", 1, "")).unwrap_err();
        assert!(matches!(err, PeerError::Handler { .. }));
    }

    #[test]
    fn malformed_payload_is_reported() {
        let h = handle();
        let mut reg = CommandRegistry::new();
        let err = reg
            .dispatch(&h, Envelope::new(commands::HTTPREQUEST, 1, vec![0xFF, 0xFF]))
            .unwrap_err();
        assert!(matches!(err, PeerError::Payload { ref command, .. } if command == commands::HTTPREQUEST));
    }

    #[test]
    fn unregistered_uri_is_fatal() {
        let h = handle();
        let mut reg = CommandRegistry::new();
        let request = HttpRequest {
            req_id: 1,
            uri: "/missing".into(),
            method: "GET".into(),
            variable_data: Vec::new(),
        };
        let err = reg
            .dispatch(&h, env(commands::HTTPREQUEST, 1, &request))
            .unwrap_err();
        assert!(matches!(err, PeerError::UnregisteredUri { ref uri, .. } if uri == "/missing"));
    }

    #[test]
    fn registered_uri_is_served() {
        let h = handle();
        h.add_uri_handler("GET", "/hello", false, |ctx: &Handle, req: &HttpRequest| -> Result<()> {
            ctx.send_http_response(req.req_id, "hi", 200, false, true)
        })
        .unwrap();
        sent(&h);

        let mut reg = CommandRegistry::new();
        let request = HttpRequest {
            req_id: 12,
            uri: "/hello".into(),
            method: "GET".into(),
            variable_data: Vec::new(),
        };
        reg.dispatch(&h, env(commands::HTTPREQUEST, 3, &request))
            .unwrap();

        let out = sent(&h);
        assert_eq!(out.len(), 2);
        let first = HttpResponse::decode(out[0].content.clone()).unwrap();
        assert_eq!(first.req_id, 12);
        assert_eq!(first.content.as_deref(), Some(&b"hi"[..]));
    }

    #[test]
    fn auth_token_is_stored() {
        let h = handle();
        let mut reg = CommandRegistry::new();
        reg.dispatch(
            &h,
            env(
                commands::HTTPAUTH,
                1,
                &HttpAuthToken {
                    token: "s3cret".into(),
                },
            ),
        )
        .unwrap();
        assert_eq!(h.auth_token().as_deref(), Some("s3cret"));
    }

    #[test]
    fn datasource_commands_use_capabilities() {
        let h = handle();
        let mut reg = CommandRegistry::new();
        reg.set_capabilities(DatasourceCapabilities::new().with_probe_source(
            |ctx: &Handle, seqno: u64, definition: &str| -> Result<()> {
                ctx.send_datasource_probe_report(
                    seqno,
                    definition.starts_with("hci"),
                    None,
                    Default::default(),
                )?;
                Ok(())
            },
        ));

        reg.dispatch(
            &h,
            env(
                commands::KDSPROBESOURCE,
                4,
                &ProbeSource {
                    definition: "hci0".into(),
                },
            ),
        )
        .unwrap();
        reg.dispatch(&h, env(commands::KDSLISTINTERFACES, 5, &ListInterfaces {}))
            .unwrap();

        let out = sent(&h);
        assert_eq!(out[0].command, commands::KDSPROBESOURCEREPORT);
        assert_eq!(out[1].command, commands::KDSINTERFACESREPORT);
        let probe = crate::datasource::ProbeSourceReport::decode(out[0].content.clone()).unwrap();
        assert!(probe.success.unwrap().success);
    }
}
