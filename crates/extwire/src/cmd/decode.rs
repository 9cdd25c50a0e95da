use extwire_frame::{FrameConfig, FrameError, PacketReader};

use crate::cmd::{open_input, DecodeArgs};
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{EnvelopePrinter, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input = open_input(args.path.as_ref())?;
    let reader = PacketReader::with_config(
        input,
        FrameConfig {
            max_payload_size: args.max_payload,
        },
    );

    let mut printer = EnvelopePrinter::new(format);
    let mut failure = None;
    for item in reader {
        match item {
            Ok(envelope) => printer.print(&envelope),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
        if args.count.is_some_and(|count| printer.printed() >= count) {
            break;
        }
    }
    let decoded = printer.printed();
    printer.finish();

    match failure {
        None => Ok(SUCCESS),
        Some(FrameError::ConnectionClosed) => Err(CliError::new(
            DATA_INVALID,
            format!("truncated packet after {decoded} envelopes"),
        )),
        Some(err) => Err(frame_error(&format!("decode failed after {decoded} envelopes"), err)),
    }
}
