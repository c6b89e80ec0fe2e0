//! Extraction error taxonomy
//!
//! Every failure an extractor can hit on a single page. These never abort a
//! batch: the pipeline converts them into error entries at the per-item
//! boundary.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    /// Retries ran out before any usable response arrived
    #[error("Transport failed for {url}: {cause}")]
    Transport { url: String, cause: String },

    /// Non-2xx status or an empty body reached the extractor
    #[error("Empty page at {url} (status {})", .status.map_or_else(|| "none".to_string(), |s| s.to_string()))]
    EmptyPage { url: String, status: Option<u16> },

    #[error("Required field '{field}' not found in HTML")]
    RequiredFieldMissing {
        field: String,
        context: Option<String>,
    },

    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("No items found at {url}")]
    NoItemsFound {
        url: String,
        tried_selectors: Vec<String>,
    },

    #[error("URL resolution failed: {url} - {reason}")]
    UrlResolutionFailed { url: String, reason: String },

    /// Set by the pipeline for items that were never fetched
    #[error("Cancelled before {url} was fetched")]
    Cancelled { url: String },
}

impl ParsingError {
    /// Create a required field missing error with context
    pub fn required_field_missing(field: &str, context: Option<&str>) -> Self {
        Self::RequiredFieldMissing {
            field: field.to_string(),
            context: context.map(ToString::to_string),
        }
    }

    pub fn invalid_selector(selector: &str, reason: &str) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn no_items_found(url: &str, tried_selectors: Vec<String>) -> Self {
        Self::NoItemsFound {
            url: url.to_string(),
            tried_selectors,
        }
    }

    /// "Nothing to parse" as opposed to "parse failure"
    pub fn is_empty_page(&self) -> bool {
        matches!(self, Self::EmptyPage { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Markup drift: the page was there but its structure was not
    pub fn is_extraction(&self) -> bool {
        matches!(
            self,
            Self::RequiredFieldMissing { .. }
                | Self::NoItemsFound { .. }
                | Self::UrlResolutionFailed { .. }
        )
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
