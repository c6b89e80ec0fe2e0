//! Detail page extractor
//!
//! Reads the category and release year from fixed positions of the profile
//! table, then the tracklist. Missing metadata resolves to `None` instead of
//! failing the record.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::config::{DetailSelectors, ParsingConfig};
use super::{
    ParsingError, ParsingResult, RecordExtractor, compile_selectors, element_text, page_body,
    select_first,
};
use crate::domain::{DetailRecord, FetchResult, SubItem};

const YEAR_PATTERN: &str = r"\b(\d{4})\b";

/// Normalize a `mm:ss` duration to whole seconds
///
/// Anything else (empty, missing a part, seconds past 59) is `None`.
pub fn parse_duration(raw: &str) -> Option<u32> {
    let (minutes, seconds) = raw.trim().split_once(':')?;
    if seconds.len() != 2 {
        return None;
    }

    let minutes: u32 = minutes.parse().ok()?;
    let seconds: u32 = seconds.parse().ok()?;
    if seconds >= 60 {
        return None;
    }

    minutes.checked_mul(60)?.checked_add(seconds)
}

pub struct DetailParser {
    metadata_selectors: Vec<Selector>,
    category_position: usize,
    period_position: usize,
    row_selectors: Vec<Selector>,
    title_selectors: Vec<Selector>,
    duration_selectors: Vec<Selector>,
    year_pattern: Regex,
    tried: Vec<String>,
}

impl DetailParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&ParsingConfig::default().detail)
    }

    pub fn with_config(selectors: &DetailSelectors) -> ParsingResult<Self> {
        Ok(Self {
            metadata_selectors: compile_selectors("metadata_cells", &selectors.metadata_cells)?,
            category_position: selectors.category_position,
            period_position: selectors.period_position,
            row_selectors: compile_selectors("sub_item_rows", &selectors.sub_item_rows)?,
            title_selectors: compile_selectors("sub_item_title", &selectors.sub_item_title)?,
            duration_selectors: compile_selectors("sub_item_duration", &selectors.sub_item_duration)?,
            year_pattern: Regex::new(YEAR_PATTERN)
                .map_err(|e| ParsingError::invalid_selector(YEAR_PATTERN, &e.to_string()))?,
            tried: selectors
                .metadata_cells
                .iter()
                .chain(&selectors.sub_item_rows)
                .cloned()
                .collect(),
        })
    }

    /// All elements of the first selector that matches anything
    fn select_all<'a>(root: ElementRef<'a>, selectors: &[Selector]) -> Vec<ElementRef<'a>> {
        selectors
            .iter()
            .map(|selector| root.select(selector).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default()
    }

    fn parse_year(&self, raw: &str) -> Option<i32> {
        self.year_pattern
            .captures(raw)
            .and_then(|captures| captures.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    fn extract_sub_item(&self, row: ElementRef<'_>) -> Option<SubItem> {
        // Heading rows carry no title cell
        let title = element_text(select_first(row, &self.title_selectors)?);
        if title.is_empty() {
            return None;
        }

        let duration_seconds = select_first(row, &self.duration_selectors)
            .and_then(|cell| parse_duration(&element_text(cell)));

        Some(SubItem {
            name: title,
            duration_seconds,
        })
    }
}

impl RecordExtractor for DetailParser {
    type Output = DetailRecord;

    fn extract(&self, page: &FetchResult) -> ParsingResult<Self::Output> {
        let body = page_body(page)?;
        let document = Html::parse_document(body);
        let root = document.root_element();

        let cells = Self::select_all(root, &self.metadata_selectors);
        let rows = Self::select_all(root, &self.row_selectors);

        if cells.is_empty() && rows.is_empty() {
            return Err(ParsingError::no_items_found(&page.url, self.tried.clone()));
        }

        let category = cells
            .get(self.category_position)
            .map(|cell| element_text(*cell))
            .filter(|text| !text.is_empty());
        let period = cells
            .get(self.period_position)
            .and_then(|cell| self.parse_year(&element_text(*cell)));

        let sub_items: Vec<SubItem> = rows
            .into_iter()
            .filter_map(|row| self.extract_sub_item(row))
            .collect();

        debug!(
            "Detail {}: category={:?} period={:?} sub_items={}",
            page.url,
            category,
            period,
            sub_items.len()
        );

        Ok(DetailRecord {
            category,
            period,
            sub_items,
        })
    }
}
