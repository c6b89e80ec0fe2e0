//! Stage 1: listing discovery
//!
//! Fetches every listing page at once and extracts stubs page by page.
//! A page that fails to parse costs only its own stubs.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::errors::ErrorCollector;
use crate::domain::StubRecord;
use crate::infrastructure::config::{CatalogConfig, utils};
use crate::infrastructure::{PageSource, RecordExtractor, fetch_many};

pub type ListingExtractor = dyn RecordExtractor<Output = Vec<StubRecord>>;

/// What one discovery pass produced
#[derive(Debug, Default)]
pub struct Discovery {
    /// Page order, then document order within a page
    pub stubs: Vec<StubRecord>,
    pub errors: ErrorCollector,
    pub pages_requested: usize,
    /// Pages for which the origin answered at all
    pub pages_answered: usize,
}

pub struct ListingFetcher {
    source: Arc<dyn PageSource>,
    extractor: Arc<ListingExtractor>,
    catalog: CatalogConfig,
}

impl ListingFetcher {
    pub fn new(
        source: Arc<dyn PageSource>,
        extractor: Arc<ListingExtractor>,
        catalog: CatalogConfig,
    ) -> Self {
        Self {
            source,
            extractor,
            catalog,
        }
    }

    /// Listing URLs for pages `1..=page_count`
    pub fn page_urls(&self, page_count: u32, year: Option<i32>) -> Vec<String> {
        (1..=page_count)
            .map(|page| utils::listing_page_url(&self.catalog, page, year))
            .collect()
    }

    /// Fetch exactly `page_count` listing pages and extract their stubs
    pub async fn discover(&self, page_count: u32, year: Option<i32>) -> Discovery {
        let urls = self.page_urls(page_count, year);
        info!(
            "Discovering {} listing pages{}",
            urls.len(),
            year.map(|y| format!(" for year {y}")).unwrap_or_default()
        );

        let pages = fetch_many(self.source.as_ref(), urls).await;

        let mut discovery = Discovery {
            pages_requested: pages.len(),
            ..Discovery::default()
        };

        for (position, page) in pages.iter().enumerate() {
            if page.got_response() {
                discovery.pages_answered += 1;
            }

            match self.extractor.extract(page) {
                Ok(stubs) => {
                    debug!("Listing page {}: {} stubs", position + 1, stubs.len());
                    discovery.stubs.extend(stubs);
                }
                Err(cause) => {
                    warn!("Listing page {} failed: {}", position + 1, cause);
                    discovery.errors.record(position, page.url.clone(), cause);
                }
            }
        }

        info!(
            "Discovered {} stubs from {} pages ({} failed)",
            discovery.stubs.len(),
            discovery.pages_requested,
            discovery.errors.len()
        );
        discovery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ListingParser;
    use crate::test_utils::FakeCatalog;
    use crate::test_utils::fixtures::{ListingCard, listing_page};

    fn catalog() -> CatalogConfig {
        CatalogConfig {
            base_url: "https://catalog.test".to_string(),
            search_options: "/search/?limit=3".to_string(),
            page_count: 2,
        }
    }

    fn fetcher(source: Arc<FakeCatalog>) -> ListingFetcher {
        ListingFetcher::new(source, Arc::new(ListingParser::new().unwrap()), catalog())
    }

    #[tokio::test]
    async fn zero_pages_means_zero_fetches() {
        let source = Arc::new(FakeCatalog::new());
        let discovery = fetcher(Arc::clone(&source)).discover(0, None).await;

        assert!(discovery.stubs.is_empty());
        assert_eq!(source.request_count(), 0);
    }

    #[tokio::test]
    async fn broken_page_does_not_stop_the_others() {
        let first = utils::listing_page_url(&catalog(), 1, Some(1971));
        let second = utils::listing_page_url(&catalog(), 2, Some(1971));
        let source = Arc::new(
            FakeCatalog::new()
                .with_page(
                    &first,
                    listing_page(&[ListingCard::new("A", "/master/1", "X", "/artist/1")]),
                )
                .with_page(&second, "<html><body>blocked</body></html>"),
        );

        let discovery = fetcher(Arc::clone(&source)).discover(2, Some(1971)).await;

        assert_eq!(discovery.stubs.len(), 1);
        assert_eq!(discovery.pages_requested, 2);
        assert_eq!(discovery.pages_answered, 2);

        let errors = discovery.errors.into_entries();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].url, second);
    }
}
