//! CSS selectors for catalog pages
//!
//! Every field takes a list of fallbacks tried in order, so a markup change
//! can be absorbed from the config file without a rebuild.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    pub listing: ListingSelectors,
    pub detail: DetailSelectors,
}

/// Search result page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    /// List holding the result cards
    pub cards_container: Vec<String>,
    pub card: Vec<String>,
    /// Title link; its text is the record name, its href the detail locator
    pub title_link: Vec<String>,
    /// Related-entity link (the artist credit)
    pub relation_link: Vec<String>,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            cards_container: vec![
                "ul.cards.cards_layout_text-only".to_string(),
                "ul.cards".to_string(),
            ],
            card: vec!["div.card_body".to_string()],
            title_link: vec!["a.search_result_title".to_string()],
            relation_link: vec!["span[title] a".to_string()],
        }
    }
}

/// Detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailSelectors {
    /// Cells of the profile table, read by position
    pub metadata_cells: Vec<String>,
    pub category_position: usize,
    pub period_position: usize,
    pub sub_item_rows: Vec<String>,
    pub sub_item_title: Vec<String>,
    pub sub_item_duration: Vec<String>,
}

impl Default for DetailSelectors {
    fn default() -> Self {
        Self {
            metadata_cells: vec!["div.profile div.content".to_string()],
            category_position: 0,
            period_position: 2,
            sub_item_rows: vec![
                "table.playlist tr.tracklist_track".to_string(),
                "table.playlist tr".to_string(),
            ],
            sub_item_title: vec![
                "span.tracklist_track_title".to_string(),
                "td.tracklist_track_title".to_string(),
            ],
            sub_item_duration: vec![
                "td.tracklist_track_duration span".to_string(),
                "td.tracklist_track_duration".to_string(),
            ],
        }
    }
}
