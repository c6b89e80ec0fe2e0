//! catalog-harvester - concurrent two-stage catalog harvesting
//!
//! Stage 1 discovers records on paginated listing pages, stage 2 fetches each
//! record's detail page through a bounded producer/consumer pipeline and
//! assembles complete, content-addressed records.

pub mod crawling;
pub mod domain;
pub mod infrastructure;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crawling::{HarvestError, HarvestReport, Harvester};
pub use domain::{CompleteRecord, DetailRecord, StubRecord};
pub use infrastructure::{AppConfig, HttpClient};
