//! Per-item error accounting
//!
//! Workers never append to shared state: each stage returns its own
//! [`ErrorCollector`] and the harvester chains them, listing stage first.

use serde::{Serialize, Serializer};

use crate::infrastructure::ParsingError;

fn as_display<S: Serializer>(cause: &ParsingError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(cause)
}

/// One item that produced no record, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub url: String,
    #[serde(serialize_with = "as_display")]
    pub cause: ParsingError,
}

impl ErrorEntry {
    pub fn new(url: impl Into<String>, cause: ParsingError) -> Self {
        Self {
            url: url.into(),
            cause,
        }
    }
}

/// Errors tagged with the position of the item they belong to
#[derive(Debug, Default)]
pub struct ErrorCollector {
    entries: Vec<(usize, ErrorEntry)>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, position: usize, url: impl Into<String>, cause: ParsingError) {
        self.entries.push((position, ErrorEntry::new(url, cause)));
    }

    /// Chain a later stage's errors after every entry already collected
    ///
    /// Positions of `later` are shifted past this collector's highest
    /// position, so the two stages never interleave.
    pub fn merge_after(&mut self, later: ErrorCollector) {
        let offset = self
            .entries
            .iter()
            .map(|(position, _)| position + 1)
            .max()
            .unwrap_or(0);
        self.entries.extend(
            later
                .entries
                .into_iter()
                .map(|(position, entry)| (position + offset, entry)),
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by item position, whatever order they were recorded in
    pub fn into_entries(mut self) -> Vec<ErrorEntry> {
        self.entries.sort_by_key(|(position, _)| *position);
        self.entries.into_iter().map(|(_, entry)| entry).collect()
    }
}
