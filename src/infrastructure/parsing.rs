//! HTML record extraction
//!
//! Extractors are pure: a [`FetchResult`] goes in, a record or a
//! [`ParsingError`] comes out. The pipeline only sees the
//! [`RecordExtractor`] trait, so it can be driven by synthetic fixtures.

pub mod config;
pub mod detail_parser;
pub mod listing_parser;

pub use config::{DetailSelectors, ListingSelectors, ParsingConfig};
pub use detail_parser::{DetailParser, parse_duration};
pub use super::parsing_error::{ParsingError, ParsingResult};
pub use listing_parser::ListingParser;

use scraper::{ElementRef, Selector};
use tracing::warn;
use url::Url;

use crate::domain::FetchResult;

/// Turns one fetched page into a record
pub trait RecordExtractor: Send + Sync {
    type Output: Send;

    fn extract(&self, page: &FetchResult) -> ParsingResult<Self::Output>;
}

/// Body of a page worth parsing
///
/// Raises the transport or "empty page" condition before any HTML parsing
/// is attempted, so callers can tell "nothing to parse" from "parse failure".
pub fn page_body(page: &FetchResult) -> ParsingResult<&str> {
    let Some(body) = page.body.as_deref() else {
        return Err(match &page.failure {
            Some(cause) => ParsingError::Transport {
                url: page.url.clone(),
                cause: cause.clone(),
            },
            None => ParsingError::EmptyPage {
                url: page.url.clone(),
                status: page.status,
            },
        });
    };

    if !page.is_success() || body.trim().is_empty() {
        return Err(ParsingError::EmptyPage {
            url: page.url.clone(),
            status: page.status,
        });
    }

    Ok(body)
}

/// Compile fallback selector strings, skipping the ones that do not parse
fn compile_selectors(field: &str, selector_strings: &[String]) -> ParsingResult<Vec<Selector>> {
    let mut selectors = Vec::new();
    let mut errors = Vec::new();

    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => {
                warn!("Failed to compile {} selector '{}': {}", field, selector_str, e);
                errors.push(format!("'{selector_str}': {e}"));
            }
        }
    }

    if selectors.is_empty() {
        return Err(ParsingError::invalid_selector(
            field,
            &if errors.is_empty() {
                "no selector configured".to_string()
            } else {
                errors.join(", ")
            },
        ));
    }

    Ok(selectors)
}

/// First element matched by any of the fallbacks, in fallback order
fn select_first<'a>(element: ElementRef<'a>, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    selectors
        .iter()
        .find_map(|selector| element.select(selector).next())
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve a detail-page locator against the catalog origin
pub fn resolve_locator(base_url: &str, locator: &str) -> ParsingResult<String> {
    let base = Url::parse(base_url).map_err(|e| ParsingError::UrlResolutionFailed {
        url: base_url.to_string(),
        reason: format!("Invalid base URL: {e}"),
    })?;

    base.join(locator)
        .map(String::from)
        .map_err(|e| ParsingError::UrlResolutionFailed {
            url: locator.to_string(),
            reason: format!("Failed to join URL: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_body_with_cause_is_transport_error() {
        let page = FetchResult::failed("https://c.test/p", None, "timeout after 5 attempts");
        let err = page_body(&page).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn non_success_status_is_empty_page() {
        let page = FetchResult::received("https://c.test/p", 404, "<html>gone</html>".to_string());
        let err = page_body(&page).unwrap_err();
        assert!(err.is_empty_page());
    }

    #[test]
    fn blank_body_is_empty_page() {
        let page = FetchResult::received("https://c.test/p", 200, "  \n".to_string());
        assert!(page_body(&page).unwrap_err().is_empty_page());
    }

    #[test]
    fn locator_resolution() {
        assert_eq!(
            resolve_locator("https://c.test", "/master/12-Foo").unwrap(),
            "https://c.test/master/12-Foo"
        );
        assert_eq!(
            resolve_locator("https://c.test/", "https://other.test/x").unwrap(),
            "https://other.test/x"
        );
        assert!(resolve_locator("not a url", "/x").is_err());
    }

    #[test]
    fn invalid_selectors_are_reported() {
        let err = compile_selectors("title", &["[[[".to_string()]).unwrap_err();
        assert!(matches!(err, ParsingError::InvalidSelector { .. }));

        let ok = compile_selectors("title", &["[[[".to_string(), "a.title".to_string()]);
        assert_eq!(ok.unwrap().len(), 1);
    }
}
