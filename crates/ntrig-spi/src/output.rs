use std::fmt::Write as _;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ntrig_session::{CounterEntry, Finger, SensorEvent};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    kind: &'a str,
    size: usize,
    data: String,
}

#[derive(Serialize)]
struct CountersOutput<'a> {
    counters: &'a [CounterEntry],
}

/// Header fields and verdicts of one decoded low message.
#[derive(Debug, Serialize)]
pub struct DecodedOutput {
    pub msg_type: u8,
    pub length: u16,
    pub flags: u8,
    pub large_frame: bool,
    pub fragments_remaining: u8,
    pub channel: u8,
    pub channel_name: &'static str,
    pub function: u8,
    pub payload_size: usize,
    /// `None` when the message is too short to carry a checksum.
    pub checksum_ok: Option<bool>,
    pub sequence: Option<u32>,
}

pub fn print_events(events: &[SensorEvent], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            for event in events {
                print_json(event);
            }
        }
        OutputFormat::Table => {
            if events.is_empty() {
                return;
            }
            let mut table = new_table(vec!["EVENT", "SENSOR", "ID", "X", "Y", "SIZE", "STATE"]);
            for event in events {
                match event {
                    SensorEvent::Touch(frame) => {
                        for finger in &frame.fingers {
                            table.add_row(vec![
                                format!("touch #{}", frame.frame_index),
                                frame.sensor_id.to_string(),
                                finger.track_id.to_string(),
                                finger.x.to_string(),
                                finger.y.to_string(),
                                format!("{}x{}", finger.dx, finger.dy),
                                finger_state(finger),
                            ]);
                        }
                    }
                    SensorEvent::Pen(pen) => {
                        table.add_row(vec![
                            "pen".to_string(),
                            pen.sensor_id.to_string(),
                            "-".to_string(),
                            pen.x.to_string(),
                            pen.y.to_string(),
                            format!("p={}", pen.pressure),
                            format!("buttons=0x{:02x} battery={}", pen.buttons, pen.battery),
                        ]);
                    }
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for event in events {
                match event {
                    SensorEvent::Touch(frame) => {
                        println!(
                            "touch sensor={} frame={} layout={:?} fingers={}",
                            frame.sensor_id,
                            frame.frame_index,
                            frame.layout,
                            frame.fingers.len()
                        );
                        for finger in &frame.fingers {
                            println!(
                                "  id={} x={} y={} dx={} dy={} {}",
                                finger.track_id,
                                finger.x,
                                finger.y,
                                finger.dx,
                                finger.dy,
                                finger_state(finger)
                            );
                        }
                    }
                    SensorEvent::Pen(pen) => println!(
                        "pen sensor={} x={} y={} pressure={} buttons=0x{:02x} battery={}",
                        pen.sensor_id, pen.x, pen.y, pen.pressure, pen.buttons, pen.battery
                    ),
                }
            }
        }
    }
}

pub fn print_replies(replies: &[Vec<u8>], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for reply in replies {
                print_json(&ReplyOutput {
                    kind: "reply",
                    size: reply.len(),
                    data: hex_string(reply),
                });
            }
        }
        OutputFormat::Table => {
            if replies.is_empty() {
                return;
            }
            let mut table = new_table(vec!["REPLY", "SIZE", "DATA"]);
            for (index, reply) in replies.iter().enumerate() {
                table.add_row(vec![index.to_string(), reply.len().to_string(), hex_string(reply)]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for reply in replies {
                println!("reply size={} data={}", reply.len(), hex_string(reply));
            }
        }
        OutputFormat::Raw => {
            for reply in replies {
                print_raw(reply);
            }
        }
    }
}

pub fn print_counters(counters: &[CounterEntry], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(&CountersOutput { counters }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COUNTER", "VALUE"]);
            for entry in counters {
                table.add_row(vec![entry.name.to_string(), entry.count.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for entry in counters {
                println!("{}: {}", entry.name, entry.count);
            }
        }
    }
}

pub fn print_decoded(decoded: &DecodedOutput, format: OutputFormat) {
    let checksum = match decoded.checksum_ok {
        Some(true) => "ok",
        Some(false) => "mismatch",
        None => "n/a",
    };
    let sequence = decoded
        .sequence
        .map_or_else(|| "-".to_string(), |seq| seq.to_string());

    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(decoded),
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            table
                .add_row(vec!["type".to_string(), decoded.msg_type.to_string()])
                .add_row(vec!["length".to_string(), decoded.length.to_string()])
                .add_row(vec!["flags".to_string(), format!("0x{:02x}", decoded.flags)])
                .add_row(vec![
                    "channel".to_string(),
                    format!("0x{:02x} ({})", decoded.channel, decoded.channel_name),
                ])
                .add_row(vec!["function".to_string(), format!("0x{:02x}", decoded.function)])
                .add_row(vec!["payload".to_string(), decoded.payload_size.to_string()])
                .add_row(vec!["checksum".to_string(), checksum.to_string()])
                .add_row(vec!["sequence".to_string(), sequence]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} length={} flags=0x{:02x} channel={} function=0x{:02x} payload={} checksum={} sequence={}",
                decoded.msg_type,
                decoded.length,
                decoded.flags,
                decoded.channel_name,
                decoded.function,
                decoded.payload_size,
                checksum,
                sequence
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn hex_string(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, b) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn finger_state(finger: &Finger) -> String {
    let mut flags = Vec::new();
    if finger.removed {
        flags.push("removed");
    }
    if finger.out_of_range {
        flags.push("out-of-range");
    }
    if finger.palm {
        flags.push("palm");
    }
    if flags.is_empty() {
        "down".to_string()
    } else {
        flags.join(",")
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}
