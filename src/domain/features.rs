//! Audio descriptors attached to stored tracks after a harvest

use serde::{Deserialize, Serialize};

/// Per-track audio descriptors returned by the enrichment API
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub danceability: f64,
    pub energy: f64,
    pub loudness: f64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub valence: f64,
    pub tempo: f64,
}

/// A persisted track joined with its album and artist names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrack {
    pub id: String,
    pub title: String,
    pub tempo: Option<f64>,
    pub album: String,
    pub artist: String,
}
