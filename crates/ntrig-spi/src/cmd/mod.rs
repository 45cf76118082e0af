use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::{CliError, CliResult, DATA_INVALID};
use crate::output::OutputFormat;

pub mod decode;
pub mod replay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a captured bus trace through a session.
    Replay(ReplayArgs),
    /// Decode one low message given as hex.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Replay(args) => replay::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Capture file: one bus frame per line as hex, `#` starts a comment.
    pub capture: PathBuf,
    /// Session configuration (JSON).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Print the diagnostic counters after the replay.
    #[arg(long)]
    pub counters: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Header and payload bytes as hex (whitespace ignored).
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse hex digits, ignoring whitespace.
pub fn parse_hex(text: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("odd number of hex digits ({})", digits.len()),
        ));
    }
    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| {
                    CliError::new(
                        DATA_INVALID,
                        format!("invalid hex byte {:?}", String::from_utf8_lossy(pair)),
                    )
                })
        })
        .collect()
}
