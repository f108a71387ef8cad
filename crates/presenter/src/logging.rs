use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Full filter directives, e.g. `presenter_server=trace,mio=debug`. When set
/// and valid it replaces the filter built from `--log-level`.
pub const LOG_FILTER_ENV: &str = "PRESENTER_LOG";

/// Tracing targets of the relay's own crates.
const RELAY_TARGETS: &[&str] = &[
    "presenter",
    "presenter_server",
    "presenter_channel",
    "presenter_frame",
    "presenter_transport",
];

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
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Directives for `level`: the relay crates log at `level`, third-party
/// crates only from `warn` up (or `error`, when that is what was asked for).
pub fn filter_directives(level: LogLevel) -> String {
    let fallback = match level {
        LogLevel::Error => "error",
        _ => "warn",
    };
    std::iter::once(fallback.to_string())
        .chain(
            RELAY_TARGETS
                .iter()
                .map(|target| format!("{target}={}", level.directive())),
        )
        .collect::<Vec<_>>()
        .join(",")
}

fn build_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)))
}

/// Install the stderr subscriber. Later calls are no-ops.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level))
        .with_ansi(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().flatten_event(true).try_init();
        }
    }
}
