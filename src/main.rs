use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use catalog_harvester::Harvester;
use catalog_harvester::crawling::HarvestReport;
use catalog_harvester::infrastructure::{
    AppConfig, ConfigManager, FeatureClient, HttpClient, RecordStore, SqliteRecordStore,
    init_logging_with_config,
};

#[derive(Parser, Debug)]
#[command(
    name = "catalog-harvester",
    version,
    about = "Harvest album listings and their detail pages from a music catalog"
)]
struct Cli {
    /// Amount of listing pages to scrape (default: 3)
    #[arg(short, long)]
    count: Option<u32>,

    /// Year of album release to filter
    #[arg(short, long)]
    year: Option<i32>,

    /// Set log level to debug
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Save the harvested records in the database
    #[arg(short, long, default_value_t = false)]
    save: bool,

    /// Configuration file (default: per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Detail pages fetched concurrently per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Parallel parse workers
    #[arg(long)]
    workers: Option<usize>,

    /// Write the JSON harvest report to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Database URL overriding the configured one
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Fill audio features of stored tracks after saving
    #[arg(long, default_value_t = false, requires = "save")]
    enrich: bool,

    /// Bearer token for the enrichment API
    #[arg(long, env = "ENRICHMENT_TOKEN", hide_env_values = true)]
    enrichment_token: Option<String>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if self.debug {
            config.logging.level = "debug".to_string();
        }
        if let Some(batch_size) = self.batch_size {
            config.pipeline.batch_size = batch_size;
        }
        if let Some(workers) = self.workers {
            config.pipeline.parse_workers = workers;
            config.pipeline.queue_capacity = config.pipeline.queue_capacity.max(workers);
        }
        if let Some(url) = &self.database_url {
            config.storage.database_url.clone_from(url);
        }
    }
}

async fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let manager = match path {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    manager.load_config().await
}

fn print_summary(report: &HarvestReport) {
    let stats = &report.stats;
    println!(
        "Harvest {}: {} records from {} stubs ({} skipped, {} cancelled) in {} ms",
        report.run_id,
        stats.records_assembled,
        stats.stubs_discovered,
        stats.records_skipped,
        stats.records_cancelled,
        stats.elapsed_ms
    );

    let errors = report.error_report();
    if !errors.is_empty() {
        println!("Errors ({}):", errors.len());
        for (url, cause) in errors {
            println!("  {url}: {cause}");
        }
    }
}

async fn enrich_tracks(config: &AppConfig, store: &SqliteRecordStore, token: &str) -> Result<()> {
    let client = FeatureClient::new(&config.enrichment, token)?;
    let tracks = store.fetch_tracks(None).await?;
    let pending: Vec<_> = tracks.into_iter().filter(|t| t.tempo.is_none()).collect();
    info!("Looking up audio features for {} tracks", pending.len());

    let matched = client.match_tracks(&pending).await;

    let remote_ids: Vec<String> = matched.iter().map(|(_, remote)| remote.clone()).collect();
    let features = client.audio_features(&remote_ids).await?;

    let mut updated = 0;
    for ((track_id, _), features) in matched.iter().zip(features) {
        if let Some(features) = features {
            if store.update_track_features(track_id, &features).await? {
                updated += 1;
            }
        }
    }

    info!("Audio features stored for {} of {} tracks", updated, pending.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref()).await?;
    cli.apply_overrides(&mut config);
    init_logging_with_config(&config.logging)?;
    config.validate().context("Invalid configuration")?;

    let source = Arc::new(HttpClient::new(&config.transport)?);
    let mut harvester = Harvester::new(&config, source)?;

    let store = if cli.save {
        let store = Arc::new(
            SqliteRecordStore::connect(&config.storage.database_url, config.storage.max_connections)
                .await?,
        );
        let shared: Arc<dyn RecordStore> = store.clone();
        harvester = harvester.with_store(shared);
        Some(store)
    } else {
        None
    };

    let cancel = harvester.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });

    let page_count = cli.count.unwrap_or(config.catalog.page_count);
    let report = harvester.run(page_count, cli.year).await?;
    print_summary(&report);

    if let Some(path) = &cli.output {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    if cli.enrich {
        match (&store, cli.enrichment_token.as_deref()) {
            (Some(store), Some(token)) => enrich_tracks(&config, store, token).await?,
            (_, None) => warn!("--enrich needs ENRICHMENT_TOKEN, skipping enrichment"),
            (None, _) => {}
        }
    }

    Ok(())
}
