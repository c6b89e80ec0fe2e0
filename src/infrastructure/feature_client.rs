//! Audio-feature enrichment API client
//!
//! Looks up stored tracks on a Spotify-compatible web API and fetches their
//! audio descriptors in batches. Rate limiting (429) is waited out using the
//! server's `Retry-After` header.

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Response, StatusCode, header::RETRY_AFTER};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::config::EnrichmentConfig;
use crate::domain::{AudioFeatures, StoredTrack};

/// Wait used when a 429 arrives without a usable `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    items: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FeaturesResponse {
    audio_features: Vec<Option<AudioFeatures>>,
}

pub struct FeatureClient {
    client: Client,
    api_base: Url,
    token: String,
    batch_size: usize,
    max_rate_limit_retries: u32,
}

impl FeatureClient {
    pub fn new(config: &EnrichmentConfig, token: impl Into<String>) -> Result<Self> {
        let api_base = Url::parse(&config.api_base)
            .with_context(|| format!("Invalid enrichment API base: {}", config.api_base))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create enrichment HTTP client")?;

        Ok(Self {
            client,
            api_base,
            token: token.into(),
            batch_size: config.batch_size.max(1),
            max_rate_limit_retries: config.max_rate_limit_retries,
        })
    }

    fn retry_after(response: &Response) -> Duration {
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs)
    }

    /// GET with bearer auth; `None` for client errors other than 429
    async fn get(&self, url: Url) -> Result<Option<Response>> {
        let mut rate_limited = 0;

        loop {
            let response = self
                .client
                .get(url.clone())
                .bearer_auth(&self.token)
                .send()
                .await
                .with_context(|| format!("Enrichment request failed: {url}"))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if rate_limited >= self.max_rate_limit_retries {
                    return Err(anyhow!("Still rate limited after {} retries: {}", rate_limited, url));
                }
                rate_limited += 1;
                let wait = Self::retry_after(&response);
                warn!("Rate limited by enrichment API, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
                continue;
            }

            if status.is_client_error() {
                warn!("Enrichment API answered {} for {}", status, url);
                return Ok(None);
            }
            if !status.is_success() {
                return Err(anyhow!("Enrichment API answered {} for {}", status, url));
            }

            return Ok(Some(response));
        }
    }

    /// Id of the best match for a track, `None` when nothing matches
    pub async fn search_track(&self, title: &str, album: &str, artist: &str) -> Result<Option<String>> {
        let mut url = self.api_base.join("search")?;
        url.query_pairs_mut()
            .append_pair("q", &format!("{title} {album} {artist}"))
            .append_pair("type", "track")
            .append_pair("limit", "1");

        let Some(response) = self.get(url).await? else {
            return Ok(None);
        };
        let found: SearchResponse = response.json().await.context("Malformed search response")?;

        let id = found.tracks.items.into_iter().next().map(|item| item.id);
        debug!("Search '{} - {}': {:?}", artist, title, id);
        Ok(id)
    }

    /// `(track id, remote id)` for every track the API could match
    ///
    /// A failed search skips that track only.
    pub async fn match_tracks(&self, tracks: &[StoredTrack]) -> Vec<(String, String)> {
        let mut matched = Vec::new();
        for track in tracks {
            match self.search_track(&track.title, &track.album, &track.artist).await {
                Ok(Some(remote_id)) => matched.push((track.id.clone(), remote_id)),
                Ok(None) => {}
                Err(e) => warn!("Search failed for {} - {}, skipping: {:#}", track.artist, track.title, e),
            }
        }
        matched
    }

    /// Features for every id, in input order; unmatched ids come back as `None`
    pub async fn audio_features(&self, ids: &[String]) -> Result<Vec<Option<AudioFeatures>>> {
        let mut features = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(self.batch_size) {
            let mut url = self.api_base.join("audio-features")?;
            url.query_pairs_mut().append_pair("ids", &chunk.join(","));

            let batch = match self.get(url).await? {
                Some(response) => {
                    let body: FeaturesResponse =
                        response.json().await.context("Malformed audio-features response")?;
                    body.audio_features
                }
                None => Vec::new(),
            };

            // Pad short answers so positions keep lining up with `ids`
            features.extend(
                batch
                    .into_iter()
                    .chain(std::iter::repeat(None))
                    .take(chunk.len()),
            );
        }

        info!(
            "Audio features: {}/{} matched",
            features.iter().filter(|f| f.is_some()).count(),
            ids.len()
        );
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves the canned responses in order, one per connection, and records request lines
    async fn canned_server(responses: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/v1/", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buffer = vec![0u8; 8192];
                let mut read = 0;
                while !buffer[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buffer[read..]).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    read += n;
                }
                let request = String::from_utf8_lossy(&buffer[..read]).to_string();
                let line = request.lines().next().unwrap_or_default().to_string();
                seen.lock().unwrap().push(line);
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (base, requests)
    }

    fn http(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        )
    }

    fn client(base: &str, batch_size: usize) -> FeatureClient {
        let config = EnrichmentConfig {
            api_base: base.to_string(),
            batch_size,
            max_rate_limit_retries: 3,
        };
        FeatureClient::new(&config, "token").unwrap()
    }

    const FEATURES: &str = r#"{"danceability":0.5,"energy":0.6,"loudness":-7.1,"speechiness":0.04,"acousticness":0.2,"instrumentalness":0.0,"valence":0.7,"tempo":120.0,"id":"x"}"#;

    #[tokio::test]
    async fn search_returns_first_match() {
        let body = r#"{"tracks":{"items":[{"id":"abc"},{"id":"def"}]}}"#;
        let (base, requests) = canned_server(vec![http("200 OK", "", body)]).await;

        let id = client(&base, 100)
            .search_track("So What", "Kind of Blue", "Miles Davis")
            .await
            .unwrap();

        assert_eq!(id.as_deref(), Some("abc"));
        assert!(requests.lock().unwrap()[0].contains("/v1/search?"));
    }

    #[tokio::test]
    async fn search_without_match_is_none() {
        let (base, _) =
            canned_server(vec![http("200 OK", "", r#"{"tracks":{"items":[]}}"#)]).await;
        let id = client(&base, 100).search_track("a", "b", "c").await.unwrap();
        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn rate_limit_is_waited_out() {
        let (base, requests) = canned_server(vec![
            http("429 Too Many Requests", "Retry-After: 0\r\n", "{}"),
            http("200 OK", "", r#"{"tracks":{"items":[{"id":"abc"}]}}"#),
        ])
        .await;

        let id = client(&base, 100).search_track("a", "b", "c").await.unwrap();

        assert_eq!(id.as_deref(), Some("abc"));
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn features_are_chunked_and_nulls_tolerated() {
        let first = format!(r#"{{"audio_features":[{FEATURES},null]}}"#);
        let second = format!(r#"{{"audio_features":[{FEATURES}]}}"#);
        let (base, requests) = canned_server(vec![
            http("200 OK", "", &first),
            http("200 OK", "", &second),
        ])
        .await;

        let ids: Vec<String> = ["a", "b", "c"].iter().map(ToString::to_string).collect();
        let features = client(&base, 2).audio_features(&ids).await.unwrap();

        assert_eq!(features.len(), 3);
        assert_eq!(features[0].map(|f| f.tempo), Some(120.0));
        assert!(features[1].is_none());
        assert!(features[2].is_some());

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].contains("ids=a%2Cb"));
        assert!(requests[1].contains("ids=c"));
    }

    fn stored(id: &str, title: &str) -> StoredTrack {
        StoredTrack {
            id: id.to_string(),
            title: title.to_string(),
            tempo: None,
            album: "Kind of Blue".to_string(),
            artist: "Miles Davis".to_string(),
        }
    }

    #[tokio::test]
    async fn failed_search_skips_only_that_track() {
        let (base, requests) = canned_server(vec![
            http("500 Internal Server Error", "", "{}"),
            http("200 OK", "", r#"{"tracks":{"items":[]}}"#),
            http("200 OK", "", r#"{"tracks":{"items":[{"id":"remote-3"}]}}"#),
        ])
        .await;

        let tracks = vec![
            stored("t1", "So What"),
            stored("t2", "Freddie Freeloader"),
            stored("t3", "Blue in Green"),
        ];
        let matched = client(&base, 100).match_tracks(&tracks).await;

        assert_eq!(matched, vec![("t3".to_string(), "remote-3".to_string())]);
        assert_eq!(requests.lock().unwrap().len(), 3);
    }
}
