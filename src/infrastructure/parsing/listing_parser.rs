//! Listing page extractor
//!
//! One search result page becomes a list of stub records in page order.
//! A card missing its title or artist link fails the whole page: a partial
//! page would silently shift the order callers rely on.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::config::{ListingSelectors, ParsingConfig};
use super::{
    ParsingError, ParsingResult, RecordExtractor, compile_selectors, element_text, page_body,
    select_first,
};
use crate::domain::{FetchResult, StubRecord};

pub struct ListingParser {
    container_selectors: Vec<Selector>,
    card_selectors: Vec<Selector>,
    title_selectors: Vec<Selector>,
    relation_selectors: Vec<Selector>,
    tried: Vec<String>,
}

impl ListingParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&ParsingConfig::default().listing)
    }

    pub fn with_config(selectors: &ListingSelectors) -> ParsingResult<Self> {
        Ok(Self {
            container_selectors: compile_selectors("cards_container", &selectors.cards_container)?,
            card_selectors: compile_selectors("card", &selectors.card)?,
            title_selectors: compile_selectors("title_link", &selectors.title_link)?,
            relation_selectors: compile_selectors("relation_link", &selectors.relation_link)?,
            tried: selectors.cards_container.clone(),
        })
    }

    fn extract_card(&self, card: ElementRef<'_>, index: usize, url: &str) -> ParsingResult<StubRecord> {
        let context = format!("card {index} on {url}");

        let title = select_first(card, &self.title_selectors)
            .ok_or_else(|| ParsingError::required_field_missing("title", Some(&context)))?;
        let name = element_text(title);
        if name.is_empty() {
            return Err(ParsingError::required_field_missing("title text", Some(&context)));
        }
        let locator = title
            .value()
            .attr("href")
            .ok_or_else(|| ParsingError::required_field_missing("title href", Some(&context)))?;

        let relation = select_first(card, &self.relation_selectors)
            .ok_or_else(|| ParsingError::required_field_missing("relation", Some(&context)))?;
        let relation_locator = relation
            .value()
            .attr("href")
            .ok_or_else(|| ParsingError::required_field_missing("relation href", Some(&context)))?;

        Ok(StubRecord::new(
            name,
            element_text(relation),
            relation_locator.trim(),
            locator.trim(),
        ))
    }
}

impl RecordExtractor for ListingParser {
    type Output = Vec<StubRecord>;

    fn extract(&self, page: &FetchResult) -> ParsingResult<Self::Output> {
        let body = page_body(page)?;
        let document = Html::parse_document(body);

        let container = select_first(document.root_element(), &self.container_selectors)
            .ok_or_else(|| ParsingError::no_items_found(&page.url, self.tried.clone()))?;

        // The first card selector that matches anything wins
        let cards: Vec<ElementRef<'_>> = self
            .card_selectors
            .iter()
            .map(|selector| container.select(selector).collect::<Vec<_>>())
            .find(|cards| !cards.is_empty())
            .unwrap_or_default();

        let stubs = cards
            .into_iter()
            .enumerate()
            .map(|(index, card)| self.extract_card(card, index, &page.url))
            .collect::<ParsingResult<Vec<_>>>()?;

        debug!("Extracted {} stubs from {}", stubs.len(), page.url);
        Ok(stubs)
    }
}
