//! Harvest orchestration
//!
//! Wires listing discovery, the detail pipeline and (optionally) the record
//! store into one run, and summarizes it as a [`HarvestReport`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::detail_pipeline::{DetailPipeline, PipelineError};
use super::errors::ErrorEntry;
use super::listing::ListingFetcher;
use crate::domain::CompleteRecord;
use crate::infrastructure::{AppConfig, DetailParser, ListingParser, PageSource, RecordStore};

#[derive(Error, Debug)]
pub enum HarvestError {
    /// No listing page got any response at all
    #[error("Catalog unavailable: none of the {pages} listing pages answered")]
    CatalogUnavailable { pages: usize },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Failed to store record {record}: {reason}")]
    Storage { record: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarvestStats {
    pub pages_requested: usize,
    pub pages_failed: usize,
    pub stubs_discovered: usize,
    pub records_assembled: usize,
    pub records_skipped: usize,
    pub records_cancelled: usize,
    pub records_stored: usize,
    pub max_queue_depth: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub records: Vec<CompleteRecord>,
    /// Listing failures first, then detail failures in stub order
    pub errors: Vec<ErrorEntry>,
    pub stats: HarvestStats,
}

impl HarvestReport {
    /// Flat `(url, cause)` list of everything that produced no record
    pub fn error_report(&self) -> Vec<(String, String)> {
        self.errors
            .iter()
            .map(|entry| (entry.url.clone(), entry.cause.to_string()))
            .collect()
    }
}

pub struct Harvester {
    listing: ListingFetcher,
    details: DetailPipeline,
    store: Option<Arc<dyn RecordStore>>,
    cancel: CancellationToken,
}

impl Harvester {
    /// Build both stages from configuration around a shared transport
    pub fn new(config: &AppConfig, source: Arc<dyn PageSource>) -> Result<Self, PipelineError> {
        let listing_parser = ListingParser::with_config(&config.parsing.listing)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let detail_parser = DetailParser::with_config(&config.parsing.detail)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        let cancel = CancellationToken::new();
        let details = DetailPipeline::new(
            Arc::clone(&source),
            Arc::new(detail_parser),
            config.catalog.base_url.clone(),
            config.pipeline.clone(),
        )?
        .with_cancellation(cancel.clone());

        Ok(Self {
            listing: ListingFetcher::new(source, Arc::new(listing_parser), config.catalog.clone()),
            details,
            store: None,
            cancel,
        })
    }

    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Cancelling stops the detail producer before its next batch
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self, page_count: u32, year: Option<i32>) -> Result<HarvestReport, HarvestError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let timer = Instant::now();
        info!("Harvest {} started: {} pages, year {:?}", run_id, page_count, year);

        let discovery = self.listing.discover(page_count, year).await;
        if discovery.pages_requested > 0 && discovery.pages_answered == 0 {
            error!("No listing page answered, aborting harvest {}", run_id);
            return Err(HarvestError::CatalogUnavailable {
                pages: discovery.pages_requested,
            });
        }

        let stubs_discovered = discovery.stubs.len();
        let pages_failed = discovery.errors.len();
        let enrichment = self.details.enrich(discovery.stubs).await?;

        for record in &enrichment.records {
            debug!("{} - {}", record.relation.name, record.name);
        }

        let mut records_stored = 0;
        if let Some(store) = &self.store {
            for record in &enrichment.records {
                store.save(record).await.map_err(|e| HarvestError::Storage {
                    record: record.id.to_string(),
                    reason: format!("{e:#}"),
                })?;
                records_stored += 1;
            }
            info!("Stored {} records", records_stored);
        }

        let records_skipped = enrichment.errors.len();
        let mut errors = discovery.errors;
        errors.merge_after(enrichment.errors);
        let errors = errors.into_entries();

        let stats = HarvestStats {
            pages_requested: discovery.pages_requested,
            pages_failed,
            stubs_discovered,
            records_assembled: enrichment.records.len(),
            records_skipped,
            records_cancelled: enrichment.cancelled,
            records_stored,
            max_queue_depth: enrichment.max_queue_depth,
            elapsed_ms: u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            "Harvest {} finished in {} ms: {} records, {} errors",
            run_id,
            stats.elapsed_ms,
            stats.records_assembled,
            errors.len()
        );

        Ok(HarvestReport {
            run_id,
            started_at,
            records: enrichment.records,
            errors,
            stats,
        })
    }
}
