//! xponmgrd - XPON Management Daemon
//!
//! Entry point: parses arguments, loads configuration, selects the
//! vendor backend and runs the event loop until shutdown.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use xpon_mgrd::config::Config;
use xpon_mgrd::tables::DEFAULT_CONFIG_FILE;
use xpon_mgrd::{daemon, BackendCalls, BackendRegistry, XponManager};

/// TR-181 XPON management daemon
#[derive(Parser, Debug)]
#[command(name = "xponmgrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Vendor backend name pattern, overriding the configuration file
    #[arg(short = 'b', long)]
    backend: Option<String>,

    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Registration point for compiled-in vendor backends.
///
/// A backend crate registers its factory here; the factory captures a
/// clone of `calls` so the running backend can call back into the
/// daemon. With nothing registered the daemon comes up degraded,
/// serving the schema with `XPON.ModuleError` raised.
fn register_backends(_registry: &mut BackendRegistry, _calls: &BackendCalls) {}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("starting xponmgrd");

    let mut config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(backend) = args.backend {
        config.backend = backend;
    }

    let (calls, events) = mpsc::channel(64);
    let mut registry = BackendRegistry::new();
    register_backends(&mut registry, &calls);

    let mut manager = match XponManager::new(config) {
        Ok(manager) => manager,
        Err(e) => {
            error!("cannot initialize the data model: {}", e);
            return ExitCode::FAILURE;
        }
    };
    manager.start(&registry).await;

    daemon::run(manager, events).await;
    info!("xponmgrd stopped");
    ExitCode::SUCCESS
}
