// # cfddnsd - Cloudflare DDNS Daemon
//
// This is a THIN integration layer: all update logic lives in cfddns-core.
//
// The cfddnsd daemon is responsible for:
// 1. Parsing the command line and loading the YAML configuration
// 2. Initializing logging and the runtime
// 3. Wiring the HTTP address resolver, Cloudflare provider and in-memory state
//    into the engine
// 4. Translating SIGTERM/SIGINT into engine shutdown
//
// ## Configuration
//
// - `--config PATH` / `CFDDNS_CONFIG`: YAML config file (default `config.yaml`)
// - `CFDDNS_API_TOKEN`: Overrides `cloudflare.api_token` from the file
// - `CFDDNS_MODE=dry-run`: Look up records but only log intended writes
// - `CFDDNS_LOG_LEVEL`: trace, debug, info (default), warn, error
//
// ## Example
//
// ```bash
// export CFDDNS_API_TOKEN=your_token
// cfddnsd check --config /etc/cfddns/config.yaml
// cfddnsd run --config /etc/cfddns/config.yaml
// ```

use anyhow::Result;
use cfddns_core::{DdnsConfig, DdnsEngine, MemoryStateStore};
use cfddns_ip_http::HttpAddressResolver;
use cfddns_provider_cloudflare::{CloudflareProvider, dry_run_from_env};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Environment variable selecting the log level
const LOG_LEVEL_ENV: &str = "CFDDNS_LOG_LEVEL";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Keep Cloudflare DNS records pointed at this host's public IP
#[derive(Debug, Parser)]
#[command(name = "cfddnsd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the update loop until SIGINT/SIGTERM
    Run(ConfigArgs),
    /// Validate the configuration file and exit
    Check(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "CFDDNS_CONFIG", default_value = "config.yaml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match parse_log_level(
        &std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string()),
    ) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let (args, check_only) = match &cli.command {
        Command::Run(args) => (args, false),
        Command::Check(args) => (args, true),
    };

    let config = match DdnsConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    info!(
        "Configuration loaded from {}: {} record(s), check interval {}",
        args.config.display(),
        config.records.len(),
        config.check_interval
    );

    if check_only {
        for record in &config.records {
            info!(
                "Record {} [{}] (zone {}, ttl {}, proxied {})",
                record.name,
                record.types.join(", "),
                record.zone_id,
                record.ttl,
                record.proxied
            );
        }
        info!("Configuration is valid");
        return DdnsExitCode::CleanShutdown.into();
    }

    let engine = match build_engine(&config) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Startup error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    info!("Starting cfddnsd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(engine, &config).await {
            error!("Daemon error: {}", e);
            DdnsExitCode::RuntimeError
        } else {
            DdnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Map a log level name to a tracing level
fn parse_log_level(level: &str) -> Result<Level> {
    Ok(match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => anyhow::bail!(
            "{} '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            LOG_LEVEL_ENV,
            level
        ),
    })
}

/// Construct the engine and its collaborators from configuration
fn build_engine(config: &DdnsConfig) -> Result<DdnsEngine> {
    let resolver = HttpAddressResolver::from_config(&config.ip_services)?;
    let provider = CloudflareProvider::new(config.cloudflare.api_token.clone(), dry_run_from_env())?;

    Ok(DdnsEngine::new(
        Arc::new(resolver),
        Arc::new(provider),
        Arc::new(MemoryStateStore::new()),
        config.records.clone(),
        &config.engine,
    ))
}

/// Run the engine until a shutdown signal arrives
async fn run_daemon(engine: DdnsEngine, config: &DdnsConfig) -> Result<()> {
    let signals = ShutdownSignals::install()?;
    let shutdown = CancellationToken::new();

    let token = shutdown.clone();
    let watcher = tokio::spawn(async move {
        let signal = signals.recv().await;
        info!("Received shutdown signal: {}", signal);
        token.cancel();
    });

    engine.run(config.check_interval(), shutdown).await;
    watcher.abort();

    info!("Shutting down daemon");
    Ok(())
}

/// SIGTERM and SIGINT handlers
#[cfg(unix)]
struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    /// Wait for either signal and return its name
    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// CTRL-C handler for non-Unix platforms
#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "CTRL-C",
            Err(e) => {
                tracing::warn!("Failed to wait for CTRL-C: {}", e);
                std::future::pending().await
            }
        }
    }
}
