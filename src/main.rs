use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use rpmprobe::cli::Cli;
use rpmprobe::core::{ControllerConfig, RPMController};
use rpmprobe::error::RpmError;
use rpmprobe::{config, csv_log, keylog, logging, profiling, report};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let debug_log_path = PathBuf::from("rpmprobe-debug.log");
    let logger = logging::DebugLogger::new(cli.debug, debug_log_path);

    let key_log = match &cli.ssl_key_file {
        Some(path) => match keylog::KeyLogWriter::open(std::path::Path::new(path)) {
            Ok(writer) => Some(Arc::new(writer)),
            Err(e) => {
                eprintln!("Warning: could not open key-log file {path}: {e}; disabling key logging.");
                None
            }
        },
        None => None,
    };

    let profile_guard = match &cli.profile {
        Some(path) => match profiling::ProfileGuard::start(std::path::Path::new(path)) {
            Ok(guard) => Some(guard),
            Err(e) => {
                eprintln!("Error: could not open profile file: {e}");
                return 1;
            }
        },
        None => None,
    };

    logger.stage("fetching configuration");
    let discovery_tls = rpmprobe::tls::client_config(None);
    let config = match config::fetch(&cli.config_host, cli.port, &cli.path, discovery_tls).await {
        Ok(config) => config,
        Err(e) => {
            print_error(&e);
            return 1;
        }
    };

    let (probe_loggers, throughput_loggers) = cli.logger_filename.as_deref().map(csv_log::open_all).unzip();

    let controller_config = ControllerConfig {
        saturation_timeout: Duration::from_secs(cli.saturation_timeout_secs),
        rpm_timeout: Duration::from_secs(cli.rpm_timeout_secs),
        extended_stats: cli.extended_stats,
    };

    let controller = RPMController::new(config, key_log, controller_config, logger.clone());

    let shutdown = CancellationToken::new();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_shutdown.cancel();
        }
    });

    logger.stage("running saturation loop");
    let outcome = controller
        .run(probe_loggers.as_ref(), throughput_loggers.as_ref(), shutdown)
        .await;

    if let Some(guard) = profile_guard {
        if let Err(e) = guard.finish() {
            eprintln!("Warning: failed to write CPU profile: {e}");
        }
    }

    match outcome {
        Ok(report_data) => {
            logger.stage("run complete");
            println!("{}", report::render(&report_data, &cli.config_host, cli.port));
            0
        }
        Err(e) => {
            print_error(&e);
            1
        }
    }
}

fn print_error(e: &RpmError) {
    match e {
        RpmError::ConfigInvalid(msg) => eprintln!("Invalid configuration: {msg}"),
        other => eprintln!("Error: {other}"),
    }
}
