mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "ntrig-spi", version, about = "N-Trig SPI link diagnostics")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_replay_subcommand() {
        let cli = Cli::try_parse_from([
            "ntrig-spi",
            "replay",
            "/tmp/capture.hex",
            "--config",
            "/tmp/session.json",
            "--counters",
        ])
        .expect("replay args should parse");

        match cli.command {
            Command::Replay(args) => {
                assert!(args.counters);
                assert!(args.config.is_some());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_decode_with_global_format() {
        let cli = Cli::try_parse_from(["ntrig-spi", "decode", "02 06 00 00 11 03", "--format", "json"])
            .expect("decode args should parse");
        assert!(matches!(cli.command, Command::Decode(_)));
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let err = Cli::try_parse_from(["ntrig-spi", "version", "--log-level", "loud"])
            .expect_err("unknown level should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
