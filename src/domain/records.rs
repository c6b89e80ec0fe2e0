use serde::{Deserialize, Serialize};

use super::identity::{self, RecordId};

/// Reference from an item to the entity it belongs to (the album artist)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub locator: String,
}

/// Item discovered on a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubRecord {
    pub name: String,
    pub relation: Relation,
    /// Opaque detail-page reference, usually a path relative to the catalog origin
    pub locator: String,
}

impl StubRecord {
    pub fn new(
        name: impl Into<String>,
        relation_name: impl Into<String>,
        relation_locator: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            relation: Relation {
                name: relation_name.into(),
                locator: relation_locator.into(),
            },
            locator: locator.into(),
        }
    }
}

/// One entry of a detail page tracklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubItem {
    pub name: String,
    #[serde(rename = "durationSeconds")]
    pub duration_seconds: Option<u32>,
}

/// Attributes extracted from an item's own page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub category: Option<String>,
    /// Release year
    pub period: Option<i32>,
    #[serde(rename = "subItems")]
    pub sub_items: Vec<SubItem>,
}

/// Stub and detail joined after both stages succeeded for the same item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRecord {
    pub id: RecordId,
    pub name: String,
    pub relation: Relation,
    pub locator: String,
    pub category: Option<String>,
    pub period: Option<i32>,
    #[serde(rename = "subItems")]
    pub sub_items: Vec<SubItem>,
}

impl CompleteRecord {
    pub fn from_parts(stub: StubRecord, detail: DetailRecord) -> Self {
        let id = identity::album_id(
            &stub.name,
            detail.period,
            &stub.relation.name,
            detail.sub_items.len(),
        );

        Self {
            id,
            name: stub.name,
            relation: stub.relation,
            locator: stub.locator,
            category: detail.category,
            period: detail.period,
            sub_items: detail.sub_items,
        }
    }
}

/// Raw outcome of a single GET, consumed immediately by an extractor
///
/// `body` is `None` when the transport gave up after exhausting its retry
/// policy. That is not an error by itself: the extractor turns it into one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub url: String,
    pub body: Option<String>,
    /// `None` when no response was ever received
    pub status: Option<u16>,
    /// Transport cause recorded when the retries ran out
    pub failure: Option<String>,
}

impl FetchResult {
    pub fn received(url: impl Into<String>, status: u16, body: String) -> Self {
        Self {
            url: url.into(),
            body: Some(body),
            status: Some(status),
            failure: None,
        }
    }

    pub fn failed(url: impl Into<String>, status: Option<u16>, cause: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: None,
            status,
            failure: Some(cause.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s))
    }

    /// Whether the origin answered at all, whatever the status
    pub fn got_response(&self) -> bool {
        self.status.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(tracks: usize) -> DetailRecord {
        DetailRecord {
            category: Some("Rock".to_string()),
            period: Some(1973),
            sub_items: (0..tracks)
                .map(|i| SubItem {
                    name: format!("Track {i}"),
                    duration_seconds: Some(200),
                })
                .collect(),
        }
    }

    #[test]
    fn complete_record_keeps_stub_and_detail_fields() {
        let stub = StubRecord::new("Dark Side", "Pink Floyd", "/artist/1", "/master/10");
        let record = CompleteRecord::from_parts(stub.clone(), detail(2));

        assert_eq!(record.name, "Dark Side");
        assert_eq!(record.relation, stub.relation);
        assert_eq!(record.locator, "/master/10");
        assert_eq!(record.period, Some(1973));
        assert_eq!(record.sub_items.len(), 2);
    }

    #[test]
    fn record_id_ignores_name_case() {
        let lower = StubRecord::new("dark side", "pink floyd", "/a", "/m");
        let upper = StubRecord::new("DARK SIDE", "Pink Floyd", "/a", "/m");

        let a = CompleteRecord::from_parts(lower, detail(3));
        let b = CompleteRecord::from_parts(upper, detail(3));
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn fetch_result_status_helpers() {
        let ok = FetchResult::received("http://x", 200, "<html></html>".to_string());
        assert!(ok.is_success());
        assert!(ok.got_response());

        let not_found = FetchResult::received("http://x", 404, String::new());
        assert!(!not_found.is_success());
        assert!(not_found.got_response());

        let dead = FetchResult::failed("http://x", None, "connection refused");
        assert!(!dead.is_success());
        assert!(!dead.got_response());
        assert!(dead.body.is_none());
    }
}
