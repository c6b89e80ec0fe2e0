//! Transport seam between the pipeline and the network
//!
//! [`PageSource`] is the one operation the pipeline needs from a transport.
//! The concurrent helpers here are written against the trait so that fakes
//! used in tests get the same fan-out behavior as the real HTTP client.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, Stream, StreamExt};

use crate::domain::FetchResult;

/// Something that can GET a page
///
/// Implementations never fail: exhausted retries come back as a
/// [`FetchResult`] without a body.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult;
}

/// Issue every request at once and yield `(position, result)` as each completes
///
/// One request failing does not cancel its siblings.
pub fn fetch_stream<'a, S>(
    source: &'a S,
    urls: Vec<String>,
) -> impl Stream<Item = (usize, FetchResult)> + Send + 'a
where
    S: PageSource + ?Sized,
{
    urls.into_iter()
        .enumerate()
        .map(|(position, url)| async move { (position, source.fetch(&url).await) })
        .collect::<FuturesUnordered<_>>()
}

/// Fetch all URLs concurrently; results come back in input order
pub async fn fetch_many<S>(source: &S, urls: Vec<String>) -> Vec<FetchResult>
where
    S: PageSource + ?Sized,
{
    let total = urls.len();
    let mut slots: Vec<Option<FetchResult>> = vec![None; total];

    let mut stream = std::pin::pin!(fetch_stream(source, urls));
    while let Some((position, result)) = stream.next().await {
        slots[position] = Some(result);
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Later URLs answer first
    struct ReverseLatency {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl PageSource for ReverseLatency {
        async fn fetch(&self, url: &str) -> FetchResult {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let index: u64 = url.trim_start_matches("u").parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(50 - index * 10)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            FetchResult::received(url, 200, url.to_string())
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("u{i}")).collect()
    }

    #[tokio::test]
    async fn fetch_many_preserves_input_order() {
        let source = ReverseLatency {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };

        let results = fetch_many(&source, urls(4)).await;
        let bodies: Vec<_> = results.iter().filter_map(|r| r.body.clone()).collect();

        assert_eq!(bodies, vec!["u0", "u1", "u2", "u3"]);
        // all four were in flight together, not one at a time
        assert_eq!(source.peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn fetch_stream_yields_in_completion_order() {
        let source = ReverseLatency {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };

        let positions: Vec<usize> = fetch_stream(&source, urls(3))
            .map(|(position, _)| position)
            .collect()
            .await;

        assert_eq!(positions, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn fetch_many_of_nothing_is_empty() {
        let source = ReverseLatency {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        assert!(fetch_many(&source, Vec::new()).await.is_empty());
    }
}
