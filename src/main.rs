use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use version_tracker::audit::{AppReport, Auditor, FreshnessReport};
use version_tracker::config::{self, Config};
use version_tracker::freshness::FreshnessVerdict;
use version_tracker::inventory::{ApplicationIdentity, JsonInventory};
use version_tracker::logging;
use version_tracker::resolution::{
    MemoryStore, OutcomeStore, ResolutionCache, Resolver, SqliteStore,
};
use version_tracker::source::fetchers::default_fetchers;

#[derive(Parser)]
#[command(name = "version-tracker")]
#[command(version, about = "Report installed applications with newer releases available")]
struct Cli {
    /// Inventory export (JSON array of bundle_id, name, version, build)
    #[arg(long)]
    inventory: PathBuf,

    /// Config file (defaults to $XDG_CONFIG_HOME/version-tracker/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,

    /// Ignore and do not update the resolution cache
    #[arg(long)]
    no_cache: bool,

    /// Also log to stderr
    #[arg(long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(&config::log_path(), cli.verbose)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_or_default(cli.config.as_deref())?;
    let validated = config.validate().context("invalid configuration")?;

    let mut resolver = Resolver::new(
        Arc::new(validated.registry),
        default_fetchers(),
        validated.settings,
    );
    if validated.cache.enabled && !cli.no_cache {
        let store = open_store(&validated.cache);
        resolver = resolver.with_cache(ResolutionCache::new(store, validated.cache.ttl_ms));
    }

    let auditor = Auditor::new(resolver)
        .with_ignored(config.ignored_apps.apps.clone())
        .with_name_mappings(config.app_name_mappings.clone());

    let inventory = JsonInventory::new(&cli.inventory);
    let report = auditor.audit(&inventory).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(())
}

/// SQLite store when persistent, falling back to memory if it cannot be opened
fn open_store(cache: &config::CacheConfig) -> Box<dyn OutcomeStore> {
    if cache.persistent {
        let db_path = config::db_path();
        let opened = db_path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .map_err(anyhow::Error::from)
            .and_then(|()| Ok(SqliteStore::new(&db_path, cache.max_entries)?));
        match opened {
            Ok(store) => return Box::new(store),
            Err(e) => error!("Failed to open cache at {:?}, using memory: {}", db_path, e),
        }
    }
    info!("Using in-memory resolution cache");
    Box::new(MemoryStore::new(cache.max_entries))
}

fn print_summary(report: &FreshnessReport) {
    let outdated: Vec<_> = report.outdated().collect();
    if outdated.is_empty() {
        println!("No updates found");
    } else {
        println!("Available updates:\n");
        print_entries(outdated);
    }

    let ahead: Vec<_> = report.installed_newer().collect();
    if !ahead.is_empty() {
        println!("\nInstalled newer than the latest release found:\n");
        print_entries(ahead);
    }

    let counts = report.counts();
    println!(
        "\n{} applications: {} outdated, {} up to date, {} {}",
        report.len(),
        counts.outdated,
        counts.up_to_date + counts.equal_different_build,
        counts.unknown,
        FreshnessVerdict::Unknown.as_str()
    );
}

fn print_entries(mut entries: Vec<(&ApplicationIdentity, &AppReport)>) {
    entries.sort_by_key(|(app, _)| app.name().to_lowercase());
    for (app, entry) in entries {
        let latest = entry.outcome.latest().map(|v| v.raw()).unwrap_or_default();
        println!("{}", app.name());
        println!(
            "  installed {}, latest {}",
            entry.installed.raw(),
            latest
        );
    }
}
