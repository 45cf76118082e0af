use std::path::Path;
use std::sync::Arc;

use ntrig_session::{EventRecorder, Session, SessionConfig};
use ntrig_transport::{ScriptedBus, ScriptedGate};
use tracing::{debug, info, warn};

use crate::cmd::{parse_hex, ReplayArgs};
use crate::exit::{io_error, session_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_counters, print_events, print_replies, OutputFormat};

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let config = match args.config.as_deref() {
        Some(path) => load_config(path)?,
        None => SessionConfig::default(),
    };

    let text = std::fs::read_to_string(&args.capture)
        .map_err(|err| io_error(&format!("read {}", args.capture.display()), err))?;
    let frames = parse_capture(&text)?;
    info!(frames = frames.len(), capture = %args.capture.display(), "replaying capture");

    let bus = ScriptedBus::with_frames(frames);
    let gate = ScriptedGate::new(&bus);
    let recorder = Arc::new(EventRecorder::new());
    let session = Session::new(bus.clone(), gate, Arc::clone(&recorder), config);

    while bus.pending_frames() > 0 {
        let report = session
            .service_interrupt()
            .map_err(|err| session_error("replay", err))?;
        debug!(cycles = report.cycles, remaining = bus.pending_frames(), "interrupt serviced");
        if report.output_disabled {
            warn!(remaining = bus.pending_frames(), "sensor output disabled, stopping replay");
            break;
        }
    }

    let reader = session.reply_reader();
    let mut replies = Vec::with_capacity(reader.pending());
    while reader.pending() > 0 {
        let reply = reader.recv().map_err(|err| session_error("drain replies", err))?;
        replies.push(reply.to_vec());
    }

    print_events(&recorder.take(), format);
    print_replies(&replies, format);
    if args.counters {
        print_counters(&session.counter_snapshot(), format);
    }
    Ok(SUCCESS)
}

fn load_config(path: &Path) -> CliResult<SessionConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("read {}", path.display()), err))?;
    serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("invalid config {}: {err}", path.display()),
        )
    })
}

/// One frame per non-empty line; `#` starts a comment.
fn parse_capture(text: &str) -> CliResult<Vec<Vec<u8>>> {
    let mut frames = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let data = line.split('#').next().unwrap_or_default();
        if data.trim().is_empty() {
            continue;
        }
        let frame = parse_hex(data).map_err(|err| {
            CliError::new(err.code, format!("capture line {}: {}", index + 1, err.message))
        })?;
        frames.push(frame);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_skips_comments_and_blank_lines() {
        let text = "# header\n\nff ff ff ff a5 5a e7 7e  # first\n  \n0102\n";
        let frames = parse_capture(text).expect("capture should parse");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][4..8], [0xA5, 0x5A, 0xE7, 0x7E]);
        assert_eq!(frames[1], vec![1, 2]);
    }

    #[test]
    fn capture_errors_name_the_line() {
        let err = parse_capture("00\n0g\n").unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("capture line 2:"), "{}", err.message);
    }
}
