//! Content-addressed identifiers
//!
//! Every stored entity is keyed by a hash of its normalized defining fields,
//! so harvesting the same logical record twice yields the same key and the
//! store can insert-or-ignore.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex digits kept from the blake3 digest (128 bits)
const ID_HEX_LEN: usize = 32;
const FIELD_SEPARATOR: u8 = 0x1f;

/// Stable identifier derived from normalized record fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One component of a hashed tuple
#[derive(Debug, Clone, Copy)]
pub enum Field<'a> {
    Text(&'a str),
    Number(Option<i64>),
}

/// Hash a tuple of fields; text is trimmed and lowercased first
pub fn content_id(fields: &[Field<'_>]) -> RecordId {
    let mut hasher = blake3::Hasher::new();
    for field in fields {
        match field {
            Field::Text(text) => {
                hasher.update(b"s");
                hasher.update(text.trim().to_lowercase().as_bytes());
            }
            Field::Number(Some(n)) => {
                hasher.update(b"n");
                hasher.update(n.to_string().as_bytes());
            }
            Field::Number(None) => {
                hasher.update(b"~");
            }
        }
        hasher.update(&[FIELD_SEPARATOR]);
    }

    let hex = hasher.finalize().to_hex();
    RecordId(hex.as_str()[..ID_HEX_LEN].to_string())
}

pub fn album_id(name: &str, year: Option<i32>, artist: &str, track_count: usize) -> RecordId {
    content_id(&[
        Field::Text(name),
        Field::Number(year.map(i64::from)),
        Field::Text(artist),
        Field::Number(i64::try_from(track_count).ok()),
    ])
}

pub fn artist_id(name: &str) -> RecordId {
    content_id(&[Field::Text(name)])
}

pub fn genre_id(name: &str) -> RecordId {
    content_id(&[Field::Text(name)])
}

pub fn track_id(title: &str, duration_seconds: Option<u32>, album: &RecordId) -> RecordId {
    content_id(&[
        Field::Text(title),
        Field::Number(duration_seconds.map(i64::from)),
        Field::Text(album.as_str()),
    ])
}
