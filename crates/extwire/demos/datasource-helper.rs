//! Capture-source helper answering interface listing and probing.
//!
//! Run with:
//!   cargo run --example datasource-helper --features peer
//!
//! Opening is not implemented, so the host receives the standard negative
//! report for it.

use std::os::unix::net::UnixStream;

use extwire::frame::{commands, PacketReader, PacketWriter};
use extwire::peer::datasource::{
    InterfacesReport, ListInterfaces, OpenSource, OpenSourceReport, ProbeSource,
    ProbeSourceReport, SubInterface,
};
use extwire::peer::{DatasourceCapabilities, DuplexChannel, Handle};
use extwire::transport::Duplex;
use prost::Message;

const INTERFACES: &[&str] = &["demo0", "demo1"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (helper_end, host_end) = UnixStream::pair()?;

    let mut channel = DuplexChannel::new(Duplex::from_unix_stream(helper_end))?;
    channel.set_capabilities(
        DatasourceCapabilities::new()
            .with_list_interfaces(|ctx: &Handle, seqno: u64| {
                let interfaces = INTERFACES
                    .iter()
                    .map(|name| SubInterface {
                        interface: (*name).to_string(),
                        flags: None,
                        hardware: Some("demo".into()),
                    })
                    .collect();
                ctx.send_datasource_interfaces_report(seqno, interfaces, true, None)?;
                Ok(())
            })
            .with_probe_source(|ctx: &Handle, seqno: u64, definition: &str| {
                let ours = INTERFACES.iter().any(|name| definition.starts_with(name));
                ctx.send_datasource_probe_report(seqno, ours, None, ProbeSourceReport::default())?;
                Ok(())
            }),
    );
    let running = channel.spawn()?;

    let mut reader = PacketReader::new(host_end.try_clone()?);
    let mut writer = PacketWriter::new(host_end);

    writer.send(commands::KDSLISTINTERFACES, 1, &ListInterfaces {}.encode_to_vec())?;
    let report = InterfacesReport::decode(reader.read_envelope()?.content)?;
    for iface in &report.interfaces {
        eprintln!("host: interface {}", iface.interface);
    }

    for (seqno, definition) in [(2, "demo1:name=x"), (3, "wlan0")] {
        let probe = ProbeSource {
            definition: definition.into(),
        };
        writer.send(commands::KDSPROBESOURCE, seqno, &probe.encode_to_vec())?;
        let report = ProbeSourceReport::decode(reader.read_envelope()?.content)?;
        let ok = report.success.map(|s| s.success).unwrap_or(false);
        eprintln!("host: probe {definition} -> {ok}");
    }

    let open = OpenSource {
        definition: "demo0".into(),
    };
    writer.send(commands::KDSOPENSOURCE, 4, &open.encode_to_vec())?;
    let report = OpenSourceReport::decode(reader.read_envelope()?.content)?;
    if let Some(message) = report.message {
        eprintln!("host: open refused: {}", message.msgtext);
    }

    writer.send(commands::SHUTDOWN, 5, b"")?;
    running.join()?;
    Ok(())
}
