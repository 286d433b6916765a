//! Request classification and the two response strategies.

use tracing::{debug, warn};

use crate::error::Result;
use crate::event::FetchEvent;
use crate::http::{Request, Response};
use crate::network::Network;
use crate::storage::{CacheStorage, Partition};

/// The only status that refreshes the data partition.
const DATA_REFRESH_STATUS: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Live network preferred; the data partition answers only when the
    /// fetch itself fails.
    NetworkFirst,
    /// Any stored copy wins; the network is used only on a miss.
    CacheFirst,
}

impl Strategy {
    pub fn classify(request: &Request, data_path_marker: &str) -> Self {
        if request.url.as_str().contains(data_path_marker) {
            Strategy::NetworkFirst
        } else {
            Strategy::CacheFirst
        }
    }
}

/// What the agent hands back to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Network(Response),
    Cache(Response),
    /// Network failed and nothing was cached. The host reports a failed load.
    Absent,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Network(r) | FetchOutcome::Cache(r) => Some(r),
            FetchOutcome::Absent => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Network(r) | FetchOutcome::Cache(r) => Some(r),
            FetchOutcome::Absent => None,
        }
    }

    pub fn is_from_cache(&self) -> bool {
        matches!(self, FetchOutcome::Cache(_))
    }
}

/// Network-first with fallback to the data partition.
///
/// A 200 response is copied into the partition by a task registered on the
/// event, so the response is returned without waiting for the write. When
/// the partition cannot be opened the network still answers; there is just
/// nothing to refresh or fall back on.
pub async fn network_first<S, N>(
    storage: &S,
    network: &N,
    partition_name: &str,
    event: &FetchEvent,
) -> Result<FetchOutcome>
where
    S: CacheStorage,
    N: Network,
{
    let partition = match storage.open(partition_name).await {
        Ok(partition) => Some(partition),
        Err(e) => {
            warn!(partition = %partition_name, error = %e, "Data partition unavailable");
            None
        }
    };

    match network.fetch(&event.request).await {
        Ok(response) => {
            if let Some(partition) = partition.filter(|_| response.status == DATA_REFRESH_STATUS) {
                let request = event.request.clone();
                let copy = response.clone();
                event.lifetime.wait_until(async move {
                    let result = partition.put(&request, copy).await;
                    match &result {
                        Ok(()) => debug!(url = %request.url, partition = %partition.name(), "Refreshed cached data"),
                        Err(e) => warn!(url = %request.url, error = %e, "Failed to refresh cached data"),
                    }
                    result
                });
            }
            Ok(FetchOutcome::Network(response))
        }
        Err(e) if e.is_network() => {
            debug!(url = %event.request.url, error = %e, "Network unavailable, falling back to cached data");
            let cached = match &partition {
                Some(partition) => partition.match_request(&event.request).await?,
                None => None,
            };
            match cached {
                Some(cached) => Ok(FetchOutcome::Cache(cached)),
                None => {
                    debug!(url = %event.request.url, "No cached data to fall back on");
                    Ok(FetchOutcome::Absent)
                }
            }
        }
        Err(e) => Err(e),
    }
}

/// Cache-first across every partition, network on miss.
///
/// Responses fetched on a miss are not written back.
pub async fn cache_first<S, N>(storage: &S, network: &N, request: &Request) -> Result<FetchOutcome>
where
    S: CacheStorage,
    N: Network,
{
    if let Some(cached) = storage.match_any(request).await? {
        debug!(url = %request.url, "Serving from cache");
        return Ok(FetchOutcome::Cache(cached));
    }

    debug!(url = %request.url, "Cache miss, fetching from network");
    let response = network.fetch(request).await?;
    Ok(FetchOutcome::Network(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::stub::StubNetwork;
    use crate::storage::{FileStorage, MemoryStorage};
    use tempfile::TempDir;

    const DATA_URL: &str = "https://menu.example/menu-data.json";

    #[test]
    fn test_classify() {
        let marker = "/menu-data.json";
        let data = Request::get("https://menu.example/menu-data.json?v=3").unwrap();
        let shell = Request::get("https://menu.example/index.html").unwrap();
        let font = Request::get("https://fonts.googleapis.com/css2?family=Inter").unwrap();

        assert_eq!(Strategy::classify(&data, marker), Strategy::NetworkFirst);
        assert_eq!(Strategy::classify(&shell, marker), Strategy::CacheFirst);
        assert_eq!(Strategy::classify(&font, marker), Strategy::CacheFirst);
    }

    #[test]
    fn test_outcome_accessors() {
        let cached = FetchOutcome::Cache(Response::new(200, "x"));
        assert!(cached.is_from_cache());
        assert_eq!(cached.response().map(|r| r.status), Some(200));
        assert!(FetchOutcome::Absent.into_response().is_none());
    }

    #[tokio::test]
    async fn test_network_first_does_not_store_non_200() {
        let storage = MemoryStorage::default();
        let network = StubNetwork::new().respond(DATA_URL, Response::new(204, Vec::new()));
        let event = FetchEvent::new(Request::get(DATA_URL).unwrap());

        let outcome = network_first(&storage, &network, "data", &event).await.unwrap();
        assert_eq!(outcome.response().map(|r| r.status), Some(204));
        assert_eq!(event.lifetime.pending(), 0);

        let partition = storage.open("data").await.unwrap();
        assert!(partition.is_empty().await);
    }

    #[tokio::test]
    async fn test_network_first_returns_error_status_without_fallback() {
        let storage = MemoryStorage::default();
        let request = Request::get(DATA_URL).unwrap();
        let partition = storage.open("data").await.unwrap();
        partition.put(&request, Response::new(200, "stale")).await.unwrap();

        let network = StubNetwork::new().respond(DATA_URL, Response::new(500, "boom"));
        let event = FetchEvent::new(request);
        let outcome = network_first(&storage, &network, "data", &event).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Network(Response {
            url: Some(DATA_URL.to_string()),
            ..Response::new(500, "boom")
        }));
        let stored = partition.match_request(&event.request).await.unwrap().unwrap();
        assert_eq!(stored.text(), "stale");
    }

    #[tokio::test]
    async fn test_network_first_survives_unreadable_data_partition() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        std::fs::write(temp_dir.path().join("menu-data-cache-v1.json"), "{ truncated").unwrap();

        let network = StubNetwork::new().respond(DATA_URL, Response::new(200, r#"{"items":[]}"#));
        let event = FetchEvent::new(Request::get(DATA_URL).unwrap());
        let outcome = network_first(&storage, &network, "menu-data-cache-v1", &event)
            .await
            .unwrap();
        event.lifetime.settle().await;

        assert_eq!(network.call_count(), 1);
        assert_eq!(outcome.response().map(|r| r.text()), Some(r#"{"items":[]}"#.to_string()));
        let stored = storage
            .open("menu-data-cache-v1")
            .await
            .unwrap()
            .match_request(&event.request)
            .await
            .unwrap();
        assert_eq!(stored.map(|r| r.status), Some(200));
    }

    #[tokio::test]
    async fn test_network_first_fetches_when_partition_cannot_open() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        let network = StubNetwork::new().respond(DATA_URL, Response::new(200, "{}"));

        let event = FetchEvent::new(Request::get(DATA_URL).unwrap());
        let outcome = network_first(&storage, &network, "not a valid name", &event)
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::Network(_)));
        assert_eq!(event.lifetime.pending(), 0);

        network.set_offline(true);
        let offline = FetchEvent::new(Request::get(DATA_URL).unwrap());
        let outcome = network_first(&storage, &network, "not a valid name", &offline)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Absent);
    }

    #[tokio::test]
    async fn test_cache_first_miss_with_unreadable_partition_goes_to_network() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        storage.open("menu-elegante-cache-v1").await.unwrap();
        std::fs::write(temp_dir.path().join("menu-elegante-cache-v0.json"), "{ truncated").unwrap();

        let url = "https://menu.example/favicon.ico";
        let network = StubNetwork::new().respond(url, Response::new(200, "ico"));
        let outcome = cache_first(&storage, &network, &Request::get(url).unwrap())
            .await
            .unwrap();

        assert!(!outcome.is_from_cache());
        assert_eq!(network.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_miss_does_not_write_back() {
        let storage = MemoryStorage::default();
        storage.open("static").await.unwrap();
        let url = "https://placehold.co/80x80/20B2AA/fff?text=J";
        let network = StubNetwork::new().respond(url, Response::new(200, "png"));
        let request = Request::get(url).unwrap();

        let first = cache_first(&storage, &network, &request).await.unwrap();
        assert!(!first.is_from_cache());
        let second = cache_first(&storage, &network, &request).await.unwrap();
        assert!(!second.is_from_cache());
        assert_eq!(network.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_first_miss_offline_propagates_error() {
        let storage = MemoryStorage::default();
        let network = StubNetwork::new();
        let request = Request::get("https://menu.example/about.html").unwrap();

        let err = cache_first(&storage, &network, &request).await.unwrap_err();
        assert!(err.is_network());
    }
}
