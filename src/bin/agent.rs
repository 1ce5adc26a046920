use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use metraflow::{
    Engine, EngineHandle, FileConfigSource, ProcessorRegistry,
    config::read_config_file,
    util::{get_config_path, get_log_level},
};
use tracing::{debug, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Metrics pipeline agent")]
struct Args {
    /// Log level, overrides METRAFLOW_LOG
    #[arg(long, global = true)]
    log_level: Option<LevelFilter>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the pipeline until terminated, reloading on SIGHUP
    Serve {
        /// Config file
        #[arg(short)]
        file: Option<PathBuf>,
    },

    /// Check a config file and exit
    Validate {
        /// Config file
        #[arg(short)]
        file: Option<PathBuf>,
    },

    /// List the available processor types
    Types,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_target("metraflow", level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level.unwrap_or_else(get_log_level));
    trace!("started with args: {args:?}");

    let registry = ProcessorRegistry::with_builtins();

    match args.command {
        Command::Serve { file } => serve(registry, get_config_path(file)).await,
        Command::Validate { file } => validate(&registry, get_config_path(file)),
        Command::Types => {
            for kind in registry.available_types() {
                println!("{kind}");
            }
            Ok(())
        }
    }
}

async fn serve(registry: ProcessorRegistry, path: PathBuf) -> anyhow::Result<()> {
    info!("serving pipeline from {}", path.display());
    let signals = Signals::install()?;
    let (mut engine, handle) = Engine::new(registry, FileConfigSource::new(path));

    tokio::spawn(signals.forward(handle));

    engine.run().await?;
    Ok(())
}

fn validate(registry: &ProcessorRegistry, path: PathBuf) -> anyhow::Result<()> {
    let config = read_config_file(&path)?;
    config
        .validate(registry)
        .with_context(|| format!("{} is invalid", path.display()))?;

    println!(
        "{} is valid: {} processor(s), {} conveyor(s)",
        path.display(),
        config.processors.len(),
        config.conveyors.len()
    );
    Ok(())
}

/// Process signal listeners, installed before the engine starts so a failure
/// aborts `serve` instead of leaving the engine without a way to stop
#[cfg(unix)]
struct Signals {
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> anyhow::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            terminate: signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?,
            hangup: signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?,
        })
    }

    /// Translate process signals into engine signals
    async fn forward(mut self, handle: EngineHandle) {
        loop {
            let result = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    debug!("received SIGINT");
                    handle.shutdown().await
                }
                _ = self.terminate.recv() => {
                    debug!("received SIGTERM");
                    handle.shutdown().await
                }
                _ = self.hangup.recv() => {
                    debug!("received SIGHUP");
                    handle.reload().await
                }
            };

            if let Err(e) = result {
                debug!("stopped forwarding signals: {e:#}");
                return;
            }
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> anyhow::Result<Self> {
        Ok(Self)
    }

    async fn forward(self, handle: EngineHandle) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            return;
        }
        if let Err(e) = handle.shutdown().await {
            debug!("stopped forwarding signals: {e:#}");
        }
    }
}
