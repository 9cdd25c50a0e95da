use std::io::Read;

use extwire_frame::checksum;

use crate::cmd::{open_input, ChecksumArgs};
use crate::exit::{io_error, CliResult, SUCCESS};
use crate::output::{print_fields, OutputFormat};

pub fn run(args: ChecksumArgs, format: OutputFormat) -> CliResult<i32> {
    let mut input = open_input(args.path.as_ref())?;
    let mut data = Vec::new();
    input
        .read_to_end(&mut data)
        .map_err(|err| io_error("failed reading input", err))?;

    let sum = checksum(&data);
    print_fields(
        &[
            ("checksum", format!("0x{sum:08x}")),
            ("decimal", sum.to_string()),
            ("length", data.len().to_string()),
        ],
        format,
    );
    Ok(SUCCESS)
}
