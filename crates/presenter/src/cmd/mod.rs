use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use presenter_channel::MediaKind;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

pub const DEFAULT_ADDR: &str = "127.0.0.1:7006";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay server.
    Serve(ServeArgs),
    /// Publish a JPEG file on a channel as a producer.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on for producers.
    #[arg(long, env = "PRESENTER_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: SocketAddr,
    /// Maximum number of registered channels.
    #[arg(long, env = "PRESENTER_MAX_CHANNELS", default_value = "10")]
    pub max_channels: usize,
    /// Unregister a channel after this long without frames or heartbeats (e.g. 100s).
    #[arg(long, env = "PRESENTER_HEARTBEAT_TIMEOUT", default_value = "100s")]
    pub heartbeat_timeout: String,
    /// Refuse opens for channels that were not registered beforehand.
    #[arg(long)]
    pub no_auto_register: bool,
    /// Channels to register at startup (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub channels: Vec<String>,
    /// Print a channel report at this interval (e.g. 5s, 500ms).
    #[arg(long)]
    pub report_interval: Option<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ContentType {
    Image,
    Video,
}

impl From<ContentType> for MediaKind {
    fn from(value: ContentType) -> Self {
        match value {
            ContentType::Image => MediaKind::Image,
            ContentType::Video => MediaKind::Video,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// JPEG file to publish.
    pub file: PathBuf,
    /// Channel to open.
    #[arg(long, short = 'c')]
    pub channel: String,
    /// Server address.
    #[arg(long, env = "PRESENTER_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: SocketAddr,
    /// Channel content type.
    #[arg(long, value_enum, default_value = "image")]
    pub content_type: ContentType,
    /// Image width reported to viewers.
    #[arg(long, default_value = "0")]
    pub width: u32,
    /// Image height reported to viewers.
    #[arg(long, default_value = "0")]
    pub height: u32,
    /// Number of times to send the image.
    #[arg(long, default_value = "1")]
    pub count: u64,
    /// Send rate when --count is above one.
    #[arg(long, default_value = "10")]
    pub fps: u32,
    /// Connect and I/O timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration(" ").is_err());
    }
}
