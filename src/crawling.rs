//! Two-stage harvesting: listing discovery feeds the detail pipeline
//!
//! - [`listing`]: stage 1, listing pages to stub records
//! - [`detail_pipeline`]: stage 2, bounded producer/consumer over detail pages
//! - [`assembler`]: joins stubs and details by position
//! - [`harvester`]: one full run plus its report

pub mod assembler;
pub mod detail_pipeline;
pub mod errors;
pub mod harvester;
pub mod listing;
pub mod queues;

pub use assembler::assemble;
pub use detail_pipeline::{DetailPipeline, Enrichment, PipelineError};
pub use errors::{ErrorCollector, ErrorEntry};
pub use harvester::{HarvestError, HarvestReport, HarvestStats, Harvester};
pub use listing::{Discovery, ListingFetcher};
pub use queues::{BoundedQueue, QueueError, QueueMetrics};
