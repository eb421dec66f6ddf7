//! fieldsync - plot and irrigation zone reconciliation service
//!
//! Main entry point for the fieldsync CLI.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use fieldsync::config::Settings;
use fieldsync::scheduler::{JobKind, Scheduler};
use fieldsync::server::ApiServer;
use fieldsync::store::{self, Store, StoreConfig};
use fieldsync::upstream::HttpSnapshotSource;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// fieldsync - keep a local store in step with the upstream plot and zone feeds
#[derive(Parser, Debug)]
#[command(name = "fieldsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/fieldsync/config.yaml)
    #[arg(short, long, env = "FIELDSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, env = "FIELDSYNC_DB")]
    db: Option<PathBuf>,

    /// Plot snapshot endpoint
    #[arg(long, env = "FIELDSYNC_PLOTS_URL")]
    plots_url: Option<String>,

    /// Zone snapshot endpoint
    #[arg(long, env = "FIELDSYNC_ZONES_URL")]
    zones_url: Option<String>,

    /// Address the API listens on
    #[arg(long, env = "FIELDSYNC_BIND")]
    bind: Option<String>,

    /// Port the API listens on, keeping the configured host
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Log per-plot decisions (ignored when RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync timers and the HTTP API (default)
    Serve {
        /// Serve the API without starting the sync timers
        #[arg(long)]
        no_schedule: bool,
    },

    /// Run a single sync pass and print its report
    Sync {
        /// Which job to run
        #[arg(long, value_enum, default_value = "plots")]
        job: JobArg,
    },

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum JobArg {
    Plots,
    Zones,
}

impl From<JobArg> for JobKind {
    fn from(arg: JobArg) -> Self {
        match arg {
            JobArg::Plots => JobKind::Plots,
            JobArg::Zones => JobKind::Zones,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if let Err(e) = fieldsync::logging::init(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(mut cli: Cli) -> anyhow::Result<()> {
    let command = cli
        .command
        .take()
        .unwrap_or(Commands::Serve { no_schedule: false });

    match command {
        Commands::InitConfig { force } => init_config(cli.config, force),
        Commands::Serve { no_schedule } => {
            let mut settings = load_settings(&cli)?;
            if no_schedule {
                settings.schedule.enabled = false;
            }
            settings.validate()?;
            runtime()?.block_on(serve(settings))
        }
        Commands::Sync { job } => {
            let settings = load_settings(&cli)?;
            settings.validate()?;
            runtime()?.block_on(sync_once(settings, job.into()))
        }
    }
}

/// Load the config file and apply the global overrides
fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = Settings::load_or_default(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        settings.store.path = db.clone();
    }
    if let Some(url) = &cli.plots_url {
        settings.upstream.plots_url = url.clone();
    }
    if let Some(url) = &cli.zones_url {
        settings.upstream.zones_url = url.clone();
    }
    if let Some(bind) = &cli.bind {
        settings.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        let mut addr: SocketAddr = settings
            .server
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", settings.server.bind))?;
        addr.set_port(port);
        settings.server.bind = addr.to_string();
    }
    Ok(settings)
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to start tokio runtime")
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(Settings::default_path);
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    Settings::new()
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn open_scheduler(settings: &Settings) -> anyhow::Result<(Store, Scheduler)> {
    let store = Store::open(StoreConfig::from(&settings.store))
        .with_context(|| format!("Failed to open store at {}", settings.store.path.display()))?;
    let source = HttpSnapshotSource::from_config(&settings.upstream)?;
    let scheduler = Scheduler::from_source(Arc::new(source), store.clone(), &settings.schedule);
    Ok((store, scheduler))
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let (store, scheduler) = open_scheduler(&settings)?;

    if settings.schedule.enabled {
        scheduler.start();
    } else {
        tracing::info!("Sync timers disabled; passes run only on manual trigger");
    }

    let server = ApiServer::new(store, scheduler.clone());
    let result = server.run(&settings.server.bind, shutdown_signal()).await;

    tracing::info!("Shutting down sync timers");
    scheduler.shutdown();
    result.context("API server failed")
}

async fn sync_once(settings: Settings, kind: JobKind) -> anyhow::Result<()> {
    let (store, scheduler) = open_scheduler(&settings)?;

    let report = scheduler
        .trigger(kind)
        .await
        .with_context(|| format!("{} pass failed", kind))?;
    let counts = store.run(|conn| store::table_counts(conn)).await?;

    let output = serde_json::json!({
        "job": kind,
        "report": report,
        "tables": counts,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to set up SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
