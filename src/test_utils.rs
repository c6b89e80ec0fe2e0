//! Test utilities for catalog-harvester
//!
//! An in-process [`FakeCatalog`] standing in for the network, plus HTML
//! fixture builders shaped like real listing and detail pages. Tests built
//! on these never open a socket.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::FetchResult;
use crate::infrastructure::PageSource;

#[derive(Debug, Clone)]
enum Canned {
    Page { status: u16, body: String },
    Unreachable,
}

/// Canned responses keyed by URL
///
/// Unknown URLs answer 404 with an empty body.
#[derive(Debug, Default)]
pub struct FakeCatalog {
    pages: HashMap<String, Canned>,
    delays: HashMap<String, Duration>,
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(
            url.to_string(),
            Canned::Page {
                status: 200,
                body: body.into(),
            },
        );
        self
    }

    pub fn with_status(mut self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.pages.insert(
            url.to_string(),
            Canned::Page {
                status,
                body: body.into(),
            },
        );
        self
    }

    /// Behaves like a host that never answered within the retry budget
    pub fn unreachable(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), Canned::Unreachable);
        self
    }

    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// URLs in the order their fetches started
    pub fn requested_urls(&self) -> Vec<String> {
        self.log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageSource for FakeCatalog {
    async fn fetch(&self, url: &str) -> FetchResult {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.log.lock() {
            log.push(url.to_string());
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(url).copied().unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.pages.get(url) {
            Some(Canned::Page { status, body }) => FetchResult::received(url, *status, body.clone()),
            Some(Canned::Unreachable) => FetchResult::failed(url, None, "connection refused after 5 attempts"),
            None => FetchResult::received(url, 404, String::new()),
        }
    }
}

/// HTML builders shaped like the catalog's markup
pub mod fixtures {
    /// One result card on a listing page
    #[derive(Debug, Clone)]
    pub struct ListingCard {
        pub title: String,
        pub locator: String,
        pub artist: String,
        pub artist_locator: String,
    }

    impl ListingCard {
        pub fn new(title: &str, locator: &str, artist: &str, artist_locator: &str) -> Self {
            Self {
                title: title.to_string(),
                locator: locator.to_string(),
                artist: artist.to_string(),
                artist_locator: artist_locator.to_string(),
            }
        }
    }

    pub fn listing_page(cards: &[ListingCard]) -> String {
        let items: String = cards
            .iter()
            .map(|card| {
                format!(
                    r#"
      <li class="card">
        <div class="card_body">
          <h4><a class="search_result_title" href="{}">{}</a></h4>
          <h5><span title="{}"><a href="{}">{}</a></span></h5>
        </div>
      </li>"#,
                    card.locator, card.title, card.artist, card.artist_locator, card.artist
                )
            })
            .collect();

        format!(
            r#"<!DOCTYPE html>
<html>
  <head><title>Search</title></head>
  <body>
    <div id="search_results">
    <ul class="cards cards_layout_text-only">{items}
    </ul>
    </div>
  </body>
</html>"#
        )
    }

    /// Detail page with a three-cell profile (genre, style, year) and a tracklist
    pub fn detail_page(category: Option<&str>, period: Option<&str>, tracks: &[(&str, &str)]) -> String {
        let rows: String = tracks
            .iter()
            .enumerate()
            .map(|(i, (title, duration))| {
                format!(
                    r#"
        <tr class="tracklist_track track">
          <td class="tracklist_track_pos">{}</td>
          <td class="track tracklist_track_title"><span class="tracklist_track_title">{title}</span></td>
          <td class="tracklist_track_duration"><span>{duration}</span></td>
        </tr>"#,
                    i + 1
                )
            })
            .collect();

        format!(
            r#"<!DOCTYPE html>
<html>
  <body>
    <div class="profile">
      <div class="head">Genre:</div><div class="content">{}</div>
      <div class="head">Style:</div><div class="content">Hard Bop</div>
      <div class="head">Year:</div><div class="content">{}</div>
    </div>
    <table class="playlist">
      <tbody>
        <tr class="track_heading"><td colspan="3">Side A</td></tr>{rows}
      </tbody>
    </table>
  </body>
</html>"#,
            category.unwrap_or_default(),
            period.unwrap_or_default()
        )
    }
}
