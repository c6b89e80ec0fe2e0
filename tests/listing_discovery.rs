//! Stage 1 discovery against an in-process fake catalog
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

use catalog_harvester::crawling::ListingFetcher;
use catalog_harvester::infrastructure::config::{CatalogConfig, utils};
use catalog_harvester::infrastructure::ListingParser;
use catalog_harvester::test_utils::FakeCatalog;
use catalog_harvester::test_utils::fixtures::{ListingCard, listing_page};

fn catalog_config() -> CatalogConfig {
    CatalogConfig {
        base_url: "https://catalog.test".to_string(),
        search_options: "/search/?limit=2&sort=have%2Cdesc".to_string(),
        page_count: 3,
    }
}

fn fetcher(source: Arc<FakeCatalog>) -> ListingFetcher {
    ListingFetcher::new(source, Arc::new(ListingParser::new().unwrap()), catalog_config())
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(3)]
#[case(7)]
#[tokio::test]
async fn issues_exactly_one_fetch_per_page(#[case] pages: u32) {
    let source = Arc::new(FakeCatalog::new());

    let discovery = fetcher(source.clone()).discover(pages, None).await;

    assert_eq!(source.request_count(), pages as usize);
    assert_eq!(discovery.pages_requested, pages as usize);
    // unknown pages answer 404, which is an empty page, not a crash
    assert_eq!(discovery.errors.len(), pages as usize);
}

#[tokio::test]
async fn stubs_follow_page_then_document_order() {
    let config = catalog_config();
    let first = utils::listing_page_url(&config, 1, None);
    let second = utils::listing_page_url(&config, 2, None);

    let source = Arc::new(
        FakeCatalog::new()
            .with_page(
                &first,
                listing_page(&[
                    ListingCard::new("One", "/master/1", "A", "/artist/a"),
                    ListingCard::new("Two", "/master/2", "B", "/artist/b"),
                ]),
            )
            .with_page(
                &second,
                listing_page(&[
                    ListingCard::new("Three", "/master/3", "C", "/artist/c"),
                    ListingCard::new("Four", "/master/4", "D", "/artist/d"),
                ]),
            )
            // page 1 answers last
            .with_delay(&first, Duration::from_millis(40)),
    );

    let discovery = fetcher(source).discover(2, None).await;

    let names: Vec<_> = discovery.stubs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["One", "Two", "Three", "Four"]);
    assert!(discovery.errors.is_empty());
}

#[tokio::test]
async fn year_filter_reaches_every_page_url() {
    let source = Arc::new(FakeCatalog::new());

    fetcher(source.clone()).discover(2, Some(1984)).await;

    let mut urls = source.requested_urls();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "https://catalog.test/search/?limit=2&sort=have%2Cdesc&page=1&year=1984".to_string(),
            "https://catalog.test/search/?limit=2&sort=have%2Cdesc&page=2&year=1984".to_string(),
        ]
    );
}

#[tokio::test]
async fn unreachable_page_is_a_transport_error() {
    let config = catalog_config();
    let source = Arc::new(FakeCatalog::new().unreachable(&utils::listing_page_url(&config, 1, None)));

    let discovery = fetcher(source).discover(1, None).await;

    assert_eq!(discovery.pages_answered, 0);
    let errors = discovery.errors.into_entries();
    assert!(errors[0].cause.is_transport());
}
