//! SQLite persistence for harvested records
//!
//! Every row is keyed by a content-addressed id and written with
//! `INSERT OR IGNORE`, so saving the same record twice is a no-op.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::domain::{
    AudioFeatures, CompleteRecord, StoredTrack, artist_id, genre_id, track_id,
};

/// Longest title stored, in characters
pub const MAX_TITLE_CHARS: usize = 255;

/// Genre used for records whose detail page had no category
pub const UNKNOWN_GENRE: &str = "unknown";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS album (
        id TEXT PRIMARY KEY,
        year INTEGER,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS artist (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS genre (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS track (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        duration INTEGER,
        album_id TEXT NOT NULL REFERENCES album (id),
        tempo REAL,
        danceability REAL,
        energy REAL,
        loudness REAL,
        speechiness REAL,
        acousticness REAL,
        instrumentalness REAL,
        valence REAL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS album_artist (
        album_id TEXT NOT NULL REFERENCES album (id),
        artist_id TEXT NOT NULL REFERENCES artist (id),
        PRIMARY KEY (album_id, artist_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS genre_album (
        genre_id TEXT NOT NULL REFERENCES genre (id),
        album_id TEXT NOT NULL REFERENCES album (id),
        PRIMARY KEY (genre_id, album_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_track_album_id ON track (album_id)",
];

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist one record with its artist, genre, tracks and join rows
    async fn save(&self, record: &CompleteRecord) -> Result<()>;

    /// Stored tracks with album and artist names; all of them when `limit` is `None`
    async fn fetch_tracks(&self, limit: Option<u32>) -> Result<Vec<StoredTrack>>;

    /// Returns whether a track with that id existed
    async fn update_track_features(&self, track_id: &str, features: &AudioFeatures) -> Result<bool>;
}

fn truncate_title(title: &str) -> String {
    title.chars().take(MAX_TITLE_CHARS).collect()
}

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database and apply the schema
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {database_url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {database_url}"))?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!("Record store ready at {}", database_url);
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn save(&self, record: &CompleteRecord) -> Result<()> {
        let artist = artist_id(&record.relation.name);
        let genre_name = record.category.as_deref().unwrap_or(UNKNOWN_GENRE);
        let genre = genre_id(genre_name);

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO album (id, year, name) VALUES ($1, $2, $3)")
            .bind(record.id.as_str())
            .bind(record.period)
            .bind(truncate_title(&record.name))
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO artist (id, name) VALUES ($1, $2)")
            .bind(artist.as_str())
            .bind(truncate_title(&record.relation.name))
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO genre (id, name) VALUES ($1, $2)")
            .bind(genre.as_str())
            .bind(genre_name)
            .execute(&mut *tx)
            .await?;

        for item in &record.sub_items {
            let id = track_id(&item.name, item.duration_seconds, &record.id);
            sqlx::query(
                "INSERT OR IGNORE INTO track (id, title, duration, album_id) VALUES ($1, $2, $3, $4)",
            )
            .bind(id.as_str())
            .bind(truncate_title(&item.name))
            .bind(item.duration_seconds)
            .bind(record.id.as_str())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("INSERT OR IGNORE INTO album_artist (album_id, artist_id) VALUES ($1, $2)")
            .bind(record.id.as_str())
            .bind(artist.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO genre_album (genre_id, album_id) VALUES ($1, $2)")
            .bind(genre.as_str())
            .bind(record.id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit()
            .await
            .with_context(|| format!("Failed to save record {}", record.id))?;

        debug!("Saved {} - {}", record.relation.name, record.name);
        Ok(())
    }

    async fn fetch_tracks(&self, limit: Option<u32>) -> Result<Vec<StoredTrack>> {
        // LIMIT -1 means no limit in SQLite
        let limit = limit.map_or(-1_i64, i64::from);

        let rows = sqlx::query(
            r#"
            SELECT t.id, t.title, t.tempo, a.name AS album, ar.name AS artist
            FROM track t
                JOIN album a ON a.id = t.album_id
                JOIN album_artist aa ON aa.album_id = a.id
                JOIN artist ar ON ar.id = aa.artist_id
            ORDER BY t.rowid
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<StoredTrack> {
                Ok(StoredTrack {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    tempo: row.try_get("tempo")?,
                    album: row.try_get("album")?,
                    artist: row.try_get("artist")?,
                })
            })
            .collect()
    }

    async fn update_track_features(&self, track_id: &str, features: &AudioFeatures) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE track SET
                tempo = $1, danceability = $2, energy = $3, loudness = $4,
                speechiness = $5, acousticness = $6, instrumentalness = $7, valence = $8
            WHERE id = $9
            "#,
        )
        .bind(features.tempo)
        .bind(features.danceability)
        .bind(features.energy)
        .bind(features.loudness)
        .bind(features.speechiness)
        .bind(features.acousticness)
        .bind(features.instrumentalness)
        .bind(features.valence)
        .bind(track_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
