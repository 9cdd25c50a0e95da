use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod checksum;
pub mod decode;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a demo helper against a host connection.
    Serve(ServeArgs),
    /// Decode a captured packet stream and print each envelope.
    Decode(DecodeArgs),
    /// Print the wire checksum of a file's bytes.
    Checksum(ChecksumArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Checksum(args) => checksum::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Inherited descriptor to read host commands from.
    #[arg(long, value_name = "FD", requires = "out_fd", conflicts_with = "connect")]
    pub in_fd: Option<i32>,
    /// Inherited descriptor to write helper output to.
    #[arg(long, value_name = "FD", requires = "in_fd")]
    pub out_fd: Option<i32>,
    /// Connect to the host instead: host:port or a Unix socket path.
    #[arg(long, value_name = "ADDR", env = "EXTWIRE_CONNECT")]
    pub connect: Option<String>,
    /// Interval between keepalive pings (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s", env = "EXTWIRE_PING_INTERVAL")]
    pub ping_interval: String,
    /// Do not ping the host; keepalive supervision stays disarmed.
    #[arg(long, conflicts_with = "ping_interval")]
    pub no_ping: bool,
    /// URI the status page is registered under.
    #[arg(long, default_value = "/extwire/status.json")]
    pub status_uri: String,
    /// Require host authentication for the status page.
    #[arg(long)]
    pub status_auth: bool,
    /// Announcement sent to the host's message bus on start.
    #[arg(long)]
    pub announce: Option<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file to decode. Reads stdin when omitted or `-`.
    pub path: Option<PathBuf>,
    /// Largest payload accepted, in bytes.
    #[arg(long, default_value_t = extwire_frame::DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
    /// Stop after N envelopes.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// File to checksum. Reads stdin when omitted or `-`.
    pub path: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open `path` for reading, with `None` or `-` meaning stdin.
pub(crate) fn open_input(path: Option<&PathBuf>) -> CliResult<Box<dyn std::io::Read>> {
    match path {
        Some(path) if path.as_os_str() != "-" => {
            let file = std::fs::File::open(path).map_err(|err| {
                crate::exit::io_error(&format!("failed opening {}", path.display()), err)
            })?;
            Ok(Box::new(file))
        }
        _ => Ok(Box::new(std::io::stdin().lock())),
    }
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("soon").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
