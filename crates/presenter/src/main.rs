mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "presenter", version, about = "Presenter relay server and producer CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level for the relay's own crates (stderr). Full filter
    /// directives in PRESENTER_LOG take precedence.
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "PRESENTER_LOG_LEVEL",
        global = true
    )]
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
    use crate::cmd::ContentType;

    #[test]
    fn parses_serve_defaults() {
        let cli = Cli::try_parse_from(["presenter", "serve"]).expect("serve args should parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.max_channels, 10);
        assert_eq!(args.heartbeat_timeout, "100s");
        assert!(!args.no_auto_register);
    }

    #[test]
    fn parses_serve_channel_list() {
        let cli = Cli::try_parse_from([
            "presenter",
            "serve",
            "--addr",
            "127.0.0.1:7100",
            "--channels",
            "cam1,cam2",
            "--no-auto-register",
        ])
        .expect("serve args should parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.addr.port(), 7100);
        assert_eq!(args.channels, vec!["cam1", "cam2"]);
        assert!(args.no_auto_register);
    }

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "presenter",
            "send",
            "/tmp/frame.jpg",
            "--channel",
            "cam1",
            "--content-type",
            "video",
            "--count",
            "5",
        ])
        .expect("send args should parse");
        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert!(matches!(args.content_type, ContentType::Video));
        assert_eq!(args.count, 5);
    }

    #[test]
    fn send_requires_channel() {
        let err = Cli::try_parse_from(["presenter", "send", "/tmp/frame.jpg"])
            .expect_err("missing channel should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn log_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "presenter",
            "serve",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ])
        .expect("log flags should parse after the subcommand");
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_unparsable_address() {
        let err = Cli::try_parse_from(["presenter", "serve", "--addr", "localhost"])
            .expect_err("bad address should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
