//! promptgate: HTTP text-generation gateway.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > RUST_LOG > config)
//!   4. Init logger once
//!   5. Select the generation backend
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Serve HTTP until shutdown

use promptgate::{config, dispatch::Dispatcher, error, llm::providers, logger, server};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), error::AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();
    logger::init(effective_log_level, force_cli_level)?;

    info!(
        bind = %config.bind,
        backend_kind = %config.backend.kind.as_str(),
        credential = config.api_key.is_some(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let backend = providers::build(&config.backend, config.api_key.clone());
    let dispatcher = Dispatcher::new(backend);

    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    server::serve(&config.bind, dispatcher, shutdown).await
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
                println!("Usage: promptgate [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Set logging verbosity (warn, info, debug, trace)");
                println!();
                println!("Environment:");
                println!("  HF_TOKEN / AI_API_KEY      Hosted backend credential");
                println!("  PROMPTGATE_BIND            Listen address override");
                println!("  PROMPTGATE_LOG_LEVEL       Log level override");
                println!("  PROMPTGATE_BACKEND         Backend override (auto, hosted, local)");
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

    CliArgs { log_level: level_for_verbosity(verbosity), config_path }
}

/// `-v` count to a forced log level. No flag leaves the level to
/// `RUST_LOG` / config.
fn level_for_verbosity(verbosity: u8) -> Option<&'static str> {
    match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        // Dispatch and provider payload sizes.
        3 => Some("debug"),
        // Full hosted request and response bodies.
        _ => Some("trace"),
    }
}
