//! keymaster-agent main entry point
//!
//! This binary handles CLI parsing, logging setup, and wiring the configured
//! source and scheme into the reconciliation daemon.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use keymaster_agent::{
    config::{Config, DEFAULT_CONFIG_PATH},
    daemon::Daemon,
    reconcile::Reconciler,
    scheme::{build_scheme, Capabilities, CommandRunner, SystemCommandRunner},
    wireguard::X25519Keys,
    APP_NAME, VERSION,
};

/// WireGuard reconciliation daemon
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version = VERSION, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync loop until interrupted
    Run,

    /// Run a single sync cycle and exit
    Once,

    /// Validate the configuration and probe the host
    Check,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Initialize structured logging with tracing
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the reconciler described by `config`
async fn build_reconciler(config: &Config) -> anyhow::Result<Reconciler> {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::default());
    let capabilities = Capabilities::probe(runner.as_ref()).await;
    let scheme = build_scheme(
        config.scheme.kind,
        capabilities,
        &config.scheme.config_dir,
        runner,
    )?;
    let source = config.source.build(config.call_timeout)?;

    Ok(Reconciler::new(source, scheme, Arc::new(X25519Keys::new()))
        .with_forced_private_key(config.private_key.clone())
        .with_call_timeout(config.call_timeout))
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("loading configuration from {}", path))
}

/// Run the CLI command; `Ok(false)` means the command ran but did not succeed
async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run => {
            info!("Starting {} v{}", APP_NAME, VERSION);
            let config = load_config(&cli.config)?;
            info!(
                source = config.source.kind(),
                url = config.source.url(),
                period = ?config.sync_period,
                "configuration loaded"
            );

            let reconciler = build_reconciler(&config).await?;
            let daemon = Daemon::new(Arc::new(reconciler), config.sync_period);
            let cycles = daemon.run_until(shutdown_signal()).await;

            info!(cycles, "Shutting down agent");
            Ok(true)
        }
        Commands::Once => {
            let config = load_config(&cli.config)?;
            let reconciler = build_reconciler(&config).await?;
            let daemon = Daemon::new(Arc::new(reconciler), config.sync_period);

            match daemon.run_cycle().await {
                Ok(report) => {
                    println!("{}", report);
                    for failure in &report.failures {
                        eprintln!("{}", failure);
                    }
                    Ok(report.is_success())
                }
                Err(e) => {
                    error!("{}", e);
                    Ok(false)
                }
            }
        }
        Commands::Check => {
            let config = load_config(&cli.config)?;
            let runner = SystemCommandRunner::default();
            let capabilities = Capabilities::probe(&runner).await;

            println!("Configuration OK: {}", cli.config);
            println!("Source: {} ({})", config.source.kind(), config.source.url());
            println!(
                "Tools: wg={} ip={} uci={}",
                capabilities.wg, capabilities.ip, capabilities.uci
            );
            println!(
                "Scheme: {} -> {}",
                config.scheme.kind,
                capabilities.resolve(config.scheme.kind)
            );

            let runner: Arc<dyn CommandRunner> = Arc::new(runner);
            match build_scheme(config.scheme.kind, capabilities, &config.scheme.config_dir, runner) {
                Ok(_) => Ok(true),
                Err(e) => {
                    eprintln!("{}", e);
                    Ok(false)
                }
            }
        }
        Commands::Version => {
            println!("{} v{}", APP_NAME, VERSION);
            Ok(true)
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
