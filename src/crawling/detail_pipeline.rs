//! Stage 2: detail pipeline coordinator
//!
//! A producer task fetches detail pages `batch_size` at a time and pushes each
//! result onto a [`BoundedQueue`] the moment it completes. The coordinator
//! waits until the queue holds a full worker pool's worth of pages (or the
//! producer is done), then parses that batch on a rayon pool. It returns only
//! once the producer is exhausted, the queue is drained and every dispatched
//! parse has come back.

use futures::StreamExt;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::assembler::assemble;
use super::errors::ErrorCollector;
use super::queues::BoundedQueue;
use crate::domain::{CompleteRecord, DetailRecord, FetchResult, StubRecord};
use crate::infrastructure::config::PipelineConfig;
use crate::infrastructure::parsing::resolve_locator;
use crate::infrastructure::{PageSource, ParsingError, ParsingResult, RecordExtractor, fetch_stream};

pub type DetailExtractor = dyn RecordExtractor<Output = DetailRecord>;

/// Fatal coordinator failures; per-item problems never end up here
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid pipeline configuration: {0}")]
    Configuration(String),

    #[error("Parse worker pool failed: {0}")]
    WorkerPool(String),

    #[error("Detail producer task panicked: {0}")]
    ProducerPanicked(String),
}

/// What one enrichment pass produced
#[derive(Debug, Default)]
pub struct Enrichment {
    /// Stub order, failed items omitted
    pub records: Vec<CompleteRecord>,
    pub errors: ErrorCollector,
    /// Items never fetched because the run was cancelled
    pub cancelled: usize,
    pub max_queue_depth: usize,
}

/// `(stub position, fetched page)`
type Fetched = (usize, FetchResult);

/// Closes the queue when the producer ends, panics included
struct CloseOnDrop(Arc<BoundedQueue<Fetched>>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

pub struct DetailPipeline {
    source: Arc<dyn PageSource>,
    extractor: Arc<DetailExtractor>,
    base_url: String,
    config: PipelineConfig,
    pool: Arc<ThreadPool>,
    cancel: CancellationToken,
}

impl DetailPipeline {
    pub fn new(
        source: Arc<dyn PageSource>,
        extractor: Arc<DetailExtractor>,
        base_url: impl Into<String>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        if config.batch_size == 0 || config.parse_workers == 0 {
            return Err(PipelineError::Configuration(
                "batch_size and parse_workers must be greater than 0".to_string(),
            ));
        }
        if config.queue_capacity < config.parse_workers {
            return Err(PipelineError::Configuration(format!(
                "queue_capacity ({}) must be at least parse_workers ({})",
                config.queue_capacity, config.parse_workers
            )));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.parse_workers)
            .thread_name(|i| format!("parse-worker-{i}"))
            .build()
            .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;

        Ok(Self {
            source,
            extractor,
            base_url: base_url.into(),
            config,
            pool: Arc::new(pool),
            cancel: CancellationToken::new(),
        })
    }

    /// Share an externally owned stop signal
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fetch, parse and assemble the detail page of every stub
    ///
    /// `records.len() + errors.len() == stubs.len()` holds for every run,
    /// cancelled ones included.
    pub async fn enrich(&self, stubs: Vec<StubRecord>) -> Result<Enrichment, PipelineError> {
        let mut errors = ErrorCollector::new();
        let mut targets = Vec::with_capacity(stubs.len());

        for (position, stub) in stubs.iter().enumerate() {
            match resolve_locator(&self.base_url, &stub.locator) {
                Ok(url) => targets.push((position, url)),
                Err(cause) => errors.record(position, stub.locator.clone(), cause),
            }
        }

        info!(
            "Enriching {} stubs: batch_size={} workers={} queue_capacity={}",
            targets.len(),
            self.config.batch_size,
            self.config.parse_workers,
            self.config.queue_capacity
        );

        let queue = Arc::new(BoundedQueue::new(self.config.queue_capacity));
        let producer = self.spawn_producer(targets, Arc::clone(&queue));

        let mut details: Vec<Option<DetailRecord>> = vec![None; stubs.len()];
        loop {
            let depth = queue.ready(self.config.parse_workers).await;
            if depth == 0 {
                break;
            }

            let batch = queue.pop_batch(self.config.parse_workers);
            debug!("Dispatching {} pages to parse workers (depth was {})", batch.len(), depth);

            for (position, url, outcome) in self.parse_batch(batch).await? {
                match outcome {
                    Ok(detail) => details[position] = Some(detail),
                    Err(cause) => {
                        warn!("Detail {} failed: {}", url, cause);
                        errors.record(position, url, cause);
                    }
                }
            }
        }

        let unfetched = producer
            .await
            .map_err(|e| PipelineError::ProducerPanicked(e.to_string()))?;
        let cancelled = unfetched.len();
        if cancelled > 0 {
            warn!("Cancelled with {} detail pages never fetched", cancelled);
        }
        for (position, url) in unfetched {
            errors.record(position, url.clone(), ParsingError::Cancelled { url });
        }

        let max_queue_depth = queue.metrics().max_depth;
        let records = assemble(stubs, details);
        info!(
            "Enriched {} records, {} skipped, max queue depth {}",
            records.len(),
            errors.len(),
            max_queue_depth
        );

        Ok(Enrichment {
            records,
            errors,
            cancelled,
            max_queue_depth,
        })
    }

    /// Returns the targets left unfetched when the stop signal fired
    fn spawn_producer(
        &self,
        targets: Vec<(usize, String)>,
        queue: Arc<BoundedQueue<Fetched>>,
    ) -> JoinHandle<Vec<(usize, String)>> {
        let source = Arc::clone(&self.source);
        let cancel = self.cancel.clone();
        let batch_size = self.config.batch_size;

        tokio::spawn(async move {
            let _close = CloseOnDrop(Arc::clone(&queue));
            let total = targets.len();

            for (batch_index, chunk) in targets.chunks(batch_size).enumerate() {
                if cancel.is_cancelled() {
                    let issued = batch_index * batch_size;
                    info!("Stop requested, {} of {} detail pages issued", issued, total);
                    return targets[issued..].to_vec();
                }

                debug!("Fetching detail batch {} ({} pages)", batch_index + 1, chunk.len());
                let urls = chunk.iter().map(|(_, url)| url.clone()).collect();
                let mut completed = std::pin::pin!(fetch_stream(source.as_ref(), urls));

                while let Some((offset, page)) = completed.next().await {
                    let position = chunk[offset].0;
                    if queue.push((position, page)).await.is_err() {
                        warn!("Queue closed under the producer, dropping the rest of the batch");
                        break;
                    }
                }
            }

            Vec::new()
        })
    }

    async fn parse_batch(
        &self,
        batch: Vec<Fetched>,
    ) -> Result<Vec<(usize, String, ParsingResult<DetailRecord>)>, PipelineError> {
        let pool = Arc::clone(&self.pool);
        let extractor = Arc::clone(&self.extractor);

        tokio::task::spawn_blocking(move || {
            pool.install(|| {
                batch
                    .into_par_iter()
                    .map(|(position, page)| {
                        let outcome = extractor.extract(&page);
                        (position, page.url, outcome)
                    })
                    .collect()
            })
        })
        .await
        .map_err(|e| PipelineError::WorkerPool(e.to_string()))
    }
}
