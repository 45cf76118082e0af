use ntrig_frame::{channel_name, decode_low_message, is_report_channel};
use ntrig_session::{compute_checksum, report_sequence};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_decoded, DecodedOutput, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)?;
    let msg = decode_low_message(&bytes).map_err(|err| frame_error("decode", err))?;

    let report = is_report_channel(msg.channel);
    let decoded = DecodedOutput {
        msg_type: msg.msg_type,
        length: msg.length,
        flags: msg.flags,
        large_frame: msg.is_large_frame(),
        fragments_remaining: msg.fragments_remaining(),
        channel: msg.channel,
        channel_name: channel_name(msg.channel),
        function: msg.function,
        payload_size: msg.payload.len(),
        checksum_ok: compute_checksum(&msg).map(|(computed, stored)| computed == stored),
        sequence: report.then(|| report_sequence(&msg)).flatten(),
    };

    print_decoded(&decoded, format);
    Ok(SUCCESS)
}
