use clap::ValueEnum;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> tracing::level_filters::LevelFilter {
        match self {
            LogLevel::Error => tracing::level_filters::LevelFilter::ERROR,
            LogLevel::Warn => tracing::level_filters::LevelFilter::WARN,
            LogLevel::Info => tracing::level_filters::LevelFilter::INFO,
            LogLevel::Debug => tracing::level_filters::LevelFilter::DEBUG,
            LogLevel::Trace => tracing::level_filters::LevelFilter::TRACE,
        }
    }
}

/// Environment variable the worker reads its log format from.
pub const LOG_FORMAT_ENV: &str = "WVPIPE_LOG_FORMAT";
/// Environment variable the worker reads its log level from.
pub const LOG_LEVEL_ENV: &str = "WVPIPE_LOG_LEVEL";

pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

/// Initialise logging from [`LOG_FORMAT_ENV`] and [`LOG_LEVEL_ENV`].
///
/// Unset or unparsable values fall back to text output at `default_level`.
pub fn init_logging_from_env(default_level: LogLevel) {
    let format = env_value(LOG_FORMAT_ENV).unwrap_or(LogFormat::Text);
    let level = env_value(LOG_LEVEL_ENV).unwrap_or(default_level);
    init_logging(format, level);
}

fn env_value<T: ValueEnum>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    parse_value(&raw)
}

fn parse_value<T: ValueEnum>(raw: &str) -> Option<T> {
    T::from_str(raw.trim(), true).ok()
}
