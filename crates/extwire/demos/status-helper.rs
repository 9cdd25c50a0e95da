//! Helper serving one URI through an in-process host.
//!
//! Run with:
//!   cargo run --example status-helper --features peer
//!
//! The host side lives on a second thread at the other end of a socket pair:
//! it requests the registered URI, prints the reassembled body and shuts
//! the helper down.

use std::os::unix::net::UnixStream;
use std::thread;

use extwire::frame::{commands, PacketReader, PacketWriter};
use extwire::peer::messages::{HttpRequest, HttpResponse};
use extwire::peer::{DuplexChannel, Handle};
use extwire::transport::Duplex;
use prost::Message;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (helper_end, host_end) = UnixStream::pair()?;

    let channel = DuplexChannel::new(Duplex::from_unix_stream(helper_end))?;
    channel.handle().add_uri_handler(
        "GET",
        "/demo/status.json",
        false,
        |ctx: &Handle, req: &HttpRequest| -> extwire::peer::Result<()> {
            let body = format!("{{\"req_id\":{},\"ok\":true}}", req.req_id);
            ctx.send_http_response(req.req_id, body.into_bytes(), 200, false, true)
        },
    )?;
    let running = channel.spawn()?;

    let host = thread::spawn(move || -> Result<(), extwire::frame::FrameError> {
        let mut reader = PacketReader::new(host_end.try_clone()?);
        let mut writer = PacketWriter::new(host_end);

        let reg = reader.read_envelope()?;
        eprintln!("host: helper sent {}", reg.command);

        let request = HttpRequest {
            req_id: 1,
            uri: "/demo/status.json".into(),
            method: "GET".into(),
            variable_data: Vec::new(),
        };
        writer.send(commands::HTTPREQUEST, 0, &request.encode_to_vec())?;

        let mut body = Vec::new();
        loop {
            let env = reader.read_envelope()?;
            let resp = HttpResponse::decode(env.content)?;
            if let Some(chunk) = &resp.content {
                body.extend_from_slice(chunk);
            }
            if resp.is_closing() {
                eprintln!(
                    "host: {} {}",
                    resp.resultcode.unwrap_or_default(),
                    String::from_utf8_lossy(&body)
                );
                break;
            }
        }

        writer.send(commands::SHUTDOWN, 1, b"")
    });

    host.join().map_err(|_| "host thread panicked")??;
    running.join()?;
    Ok(())
}
