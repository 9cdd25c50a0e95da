use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use extwire_peer::messages::HttpRequest;
use extwire_peer::{ChannelState, DuplexChannel, Handle, MessageType, PeerError};
use extwire_transport::Duplex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{peer_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};

#[derive(Serialize)]
struct StatusPage<'a> {
    name: &'a str,
    version: &'a str,
    transport: &'a str,
    uptime_secs: u64,
    requests: u64,
    authenticated: bool,
    routes: Vec<String>,
}

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let ping_interval = if args.no_ping {
        None
    } else {
        Some(parse_duration(&args.ping_interval)?)
    };

    let duplex = open_transport(&args)?;
    let transport = duplex.transport_name();
    let channel = DuplexChannel::new(duplex).map_err(|err| peer_error("transport setup failed", err))?;
    let handle = channel.handle();

    install_ctrlc_handler(handle.clone())?;
    register_status_page(&handle, &args, transport)?;

    if let Some(text) = &args.announce {
        handle
            .send_message(text, MessageType::Info)
            .map_err(|err| peer_error("announce failed", err))?;
    }
    if let Some(interval) = ping_interval {
        spawn_pinger(handle.clone(), interval)?;
    }

    info!(transport, "serving host connection");
    match channel.run() {
        Ok(()) => Ok(SUCCESS),
        Err(err) => Err(peer_error("connection terminated", err)),
    }
}

fn open_transport(args: &ServeArgs) -> CliResult<Duplex> {
    match (args.in_fd, args.out_fd, &args.connect) {
        (Some(input), Some(output), None) => {
            // SAFETY: the host hands these descriptors to this process and
            // nothing else here opens or owns them.
            unsafe { Duplex::from_raw_fds(input, output) }
                .map_err(|err| transport_error("invalid descriptors", err))
        }
        (None, None, Some(addr)) => {
            extwire_transport::connect(addr).map_err(|err| transport_error("connect failed", err))
        }
        _ => Err(CliError::new(
            USAGE,
            "either --in-fd and --out-fd, or --connect, is required",
        )),
    }
}

fn register_status_page(handle: &Handle, args: &ServeArgs, transport: &'static str) -> CliResult<()> {
    let started = Instant::now();
    let requests = Arc::new(AtomicU64::new(0));

    let status = move |ctx: &Handle, req: &HttpRequest| -> extwire_peer::Result<()> {
        let served = requests.fetch_add(1, Ordering::Relaxed) + 1;
        let page = StatusPage {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            transport,
            uptime_secs: started.elapsed().as_secs(),
            requests: served,
            authenticated: ctx.auth_token().is_some(),
            routes: ctx
                .registered_uris()
                .into_iter()
                .map(|(method, uri)| format!("{method} {uri}"))
                .collect(),
        };
        let body = serde_json::to_vec(&page)
            .map_err(|err| PeerError::handler("HTTPREQUEST", err.to_string()))?;
        debug!(req_id = req.req_id, bytes = body.len(), "serving status page");
        ctx.send_http_response(req.req_id, body, 200, false, true)
    };

    handle
        .add_uri_handler("GET", &args.status_uri, args.status_auth, status)
        .map_err(|err| peer_error("URI registration failed", err))?;
    if args.status_auth {
        handle
            .request_http_auth()
            .map_err(|err| peer_error("auth request failed", err))?;
    }
    Ok(())
}

fn spawn_pinger(handle: Handle, interval: Duration) -> CliResult<()> {
    thread::Builder::new()
        .name("extwire-ping".into())
        .spawn(move || loop {
            match handle.state() {
                ChannelState::Running if handle.is_running() => {
                    if let Err(err) = handle.send_ping() {
                        warn!(error = %err, "failed to queue ping");
                    }
                }
                state if state.is_terminal() => return,
                _ => {}
            }
            thread::sleep(interval);
        })
        .map(|_| ())
        .map_err(|err| CliError::new(INTERNAL, format!("ping thread failed to start: {err}")))
}

fn install_ctrlc_handler(handle: Handle) -> CliResult<()> {
    ctrlc::set_handler(move || handle.kill()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}
