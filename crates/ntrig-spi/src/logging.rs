use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

/// Crates that log once per bus exchange or decoded frame.
const FRAME_TARGETS: [&str; 2] = ["ntrig_transport", "ntrig_frame"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// Per-frame transport and decoder events only show at `trace`.
    fn frame_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            other => other.as_filter().min(LevelFilter::INFO),
        }
    }

    fn targets(self) -> Targets {
        FRAME_TARGETS
            .iter()
            .fold(Targets::new().with_default(self.as_filter()), |targets, target| {
                targets.with_target(*target, self.frame_filter())
            })
    }
}

/// Route logs to stderr so stdout stays machine readable.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);
    let layer = match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(layer.with_filter(level.targets()))
        .try_init();
}
