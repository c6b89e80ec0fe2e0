//! Domain module - records produced by the harvesting pipeline
//!
//! Stage 1 yields [`StubRecord`]s, stage 2 yields [`DetailRecord`]s and the
//! assembler joins both into [`CompleteRecord`]s keyed by a content-addressed
//! [`RecordId`].

pub mod features;
pub mod identity;
pub mod records;

pub use features::{AudioFeatures, StoredTrack};
pub use identity::{RecordId, album_id, artist_id, genre_id, track_id};
pub use records::{
    CompleteRecord, DetailRecord, FetchResult, Relation, StubRecord, SubItem,
};
