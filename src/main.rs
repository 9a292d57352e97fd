//! # nudged — Behavioral Nudge Delivery Daemon
//!
//! Runs the scheduled nudge passes against a SQLite history and a JSON user
//! seed, delivering through the log transport.
//!
//! Usage:
//!   nudged                               # Register triggers and run until Ctrl-C
//!   nudged --once                        # Run every pass once and exit
//!   nudged --config ./nudge.toml --json  # Custom config, JSON logs

mod log_transport;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nudge_core::traits::UserStore;
use nudge_core::NudgeConfig;
use nudge_engine::{
    BackoffCalculator, CatalogTranslator, DeliveryCoordinator, FramingService, FrequencyGovernor,
    TacticSelector,
};
use nudge_scheduler::{
    register_default_triggers, NudgePasses, OptimalTimeResolver, PassKind, TriggerRegistry,
};
use nudge_store::{MemoryUserStore, ProfilePersonas, SqliteHistory, StaticVariants};

use crate::log_transport::LogTransport;

#[derive(Parser)]
#[command(name = "nudged", version, about = "🔔 Behavioral nudge delivery engine")]
struct Cli {
    /// Config file (default: ~/.nudge/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// History database path (overrides [store].db_path)
    #[arg(long)]
    db_path: Option<String>,

    /// User seed JSON (overrides [store].users_path)
    #[arg(long)]
    users: Option<String>,

    /// Run the daily, streak and evening passes once and exit
    #[arg(long)]
    once: bool,

    /// JSON log output
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        "nudged=debug,nudge_engine=debug,nudge_scheduler=debug,nudge_store=debug"
    } else {
        "nudged=info,nudge_engine=info,nudge_scheduler=info,nudge_store=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match &cli.config {
        Some(path) => NudgeConfig::load_from(path)?,
        None => NudgeConfig::load()?,
    };

    // Expand paths
    let db_path = expand_path(cli.db_path.as_deref().unwrap_or(&config.store.db_path));
    let users_path = expand_path(cli.users.as_deref().unwrap_or(&config.store.users_path));
    if let Some(parent) = Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let history = Arc::new(SqliteHistory::open(Path::new(&db_path))?);
    let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::load_json(Path::new(&users_path))?);
    tracing::info!("💾 History: {}", db_path);
    tracing::info!("👥 Users: {} ({} loaded)", users_path, users.list_users().await?.len());

    let translator = Arc::new(CatalogTranslator::builtin(&config.i18n.base_locale)?);
    let personas = Arc::new(ProfilePersonas::new(users.clone()));

    let governor = FrequencyGovernor::new(users.clone(), history.clone(), config.governor.clone());
    let selector = TacticSelector::new(
        users.clone(),
        personas,
        history.clone(),
        config.social_proof.clone(),
    );
    let coordinator = Arc::new(DeliveryCoordinator::new(
        users.clone(),
        history.clone(),
        governor,
        selector,
        Arc::new(LogTransport),
    ));

    let passes = Arc::new(NudgePasses::new(
        users,
        coordinator,
        BackoffCalculator::new(history.clone(), config.backoff.clone()),
        OptimalTimeResolver::new(history.clone(), config.timing.clone()),
        FramingService::new(translator, Arc::new(StaticVariants::new())),
        config.streak.clone(),
        config.scheduler.clone(),
    ));

    if cli.once {
        let now = chrono::Utc::now();
        for kind in [PassKind::Daily, PassKind::Streak, PassKind::Evening] {
            passes.run(kind, now).await?;
        }
        return Ok(());
    }

    let registry = TriggerRegistry::new();
    register_default_triggers(&registry, passes, &config.scheduler)?;
    tracing::info!("🚀 nudged running with triggers: {}", registry.names().join(", "));

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutting down");
    registry.shutdown();
    Ok(())
}
