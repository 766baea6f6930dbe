//! Upstream Aggregator gateway entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI args
//!   3. Load config
//!   4. Resolve effective log level (CLI `-v` flags > env > config)
//!   5. Init logger once
//!   6. Build the shared upstream client and gateway state
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Serve until the shutdown token is cancelled

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use upstream_aggregator::bootstrap::logger;
use upstream_aggregator::config;
use upstream_aggregator::error::AppError;
use upstream_aggregator::gateway::{self, AppState};
use upstream_aggregator::upstream::{Fetch, HttpUpstream};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.server.log_level.as_str());
    logger::init(
        effective_log_level,
        args.log_level.is_some(),
        config.server.log_file.as_deref(),
    )?;

    info!(
        bind = %config.server.bind,
        configured_log_level = %config.server.log_level,
        effective_log_level = %effective_log_level,
        deadline_ms = config.server.deadline.as_millis() as u64,
        max_concurrency = config.aggregation.max_concurrency.map_or(0, |n| n.get()),
        auth = config.api_key.is_some(),
        "config loaded"
    );
    for source in &config.sources {
        info!(
            source = %source.name,
            address = %source.address,
            timeout_ms = source.timeout.as_millis() as u64,
            "upstream source"
        );
    }
    if config.sources.is_empty() {
        info!("no upstream sources configured, aggregations will be empty");
    }

    let client: Arc<dyn Fetch> = Arc::new(HttpUpstream::new(config.server.user_agent.as_deref())?);

    // Shared shutdown token. Ctrl-C cancels it; in-flight aggregations derive
    // child tokens from it.
    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let state = AppState::new(&config, client, shutdown);
    gateway::serve(&config.server.bind, state).await
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: upstream-aggregator [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    CliArgs { log_level: logger::level_for_verbosity(verbosity), config_path }
}
