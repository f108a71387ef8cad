use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use presenter_channel::{ChannelRegistry, ConsumerApi, RegistryConfig};
use presenter_server::{PresenterServer, RouterConfig, ServerConfig, ShutdownHandle};
use tracing::info;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{server_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{channel_reports, print_channels, OutputFormat};

const PORT_RANGE: std::ops::RangeInclusive<u16> = 1024..=49151;
const REPORT_TICK: Duration = Duration::from_millis(100);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    validate_listen_addr(args.addr)?;
    let heartbeat_timeout = parse_duration(&args.heartbeat_timeout)?;
    let report_interval = args
        .report_interval
        .as_deref()
        .map(parse_duration)
        .transpose()?;
    if args.max_channels == 0 {
        return Err(CliError::new(USAGE, "--max-channels must be at least 1"));
    }

    let registry = Arc::new(ChannelRegistry::with_config(RegistryConfig {
        max_channels: args.max_channels,
        heartbeat_timeout,
        ..RegistryConfig::default()
    }));
    for name in &args.channels {
        registry
            .register(name)
            .map_err(|err| CliError::new(USAGE, format!("cannot register {name}: {err}")))?;
    }

    let config = ServerConfig {
        addr: args.addr,
        router: RouterConfig {
            auto_register: !args.no_auto_register,
        },
        ..ServerConfig::default()
    };
    let server = PresenterServer::bind(config, Arc::clone(&registry))
        .map_err(|err| server_error("bind failed", err))?;
    install_ctrlc_handler(server.shutdown_handle())?;

    let Some(interval) = report_interval else {
        server.run().map_err(|err| server_error("server failed", err))?;
        return Ok(SUCCESS);
    };

    let consumer = ConsumerApi::new(registry);
    let handle = server
        .spawn()
        .map_err(|err| server_error("server start failed", err))?;
    let shutdown = handle.shutdown_handle();

    let mut last_report = Instant::now();
    while !shutdown.is_shutdown() {
        std::thread::sleep(REPORT_TICK);
        if last_report.elapsed() >= interval {
            print_channels(&channel_reports(consumer.registry()), format);
            last_report = Instant::now();
        }
    }

    handle
        .join()
        .map_err(|err| server_error("server failed", err))?;
    info!("presenter server stopped");
    Ok(SUCCESS)
}

/// Refuse the wildcard address and ports outside the registered range.
pub fn validate_listen_addr(addr: SocketAddr) -> CliResult<()> {
    if addr.ip().is_unspecified() {
        return Err(CliError::new(
            USAGE,
            format!("listen address {} is illegal", addr.ip()),
        ));
    }
    if !PORT_RANGE.contains(&addr.port()) {
        return Err(CliError::new(
            USAGE,
            format!(
                "illegal port {}: must be within {}-{}",
                addr.port(),
                PORT_RANGE.start(),
                PORT_RANGE.end()
            ),
        ));
    }
    Ok(())
}

fn install_ctrlc_handler(shutdown: ShutdownHandle) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.shutdown();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
