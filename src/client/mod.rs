pub mod types;

pub use types::{AddItemsRequest, Degradable, PodcastItem};

use crate::circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig,
    RetryExecutor,
};
use crate::error::ClientError;
use crate::metrics;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, RequestBuilder, StatusCode};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const HEALTH_CHECK: &str = "HealthCheck";
pub const ADD_ITEMS: &str = "AddItems";
pub const LIST_ITEMS: &str = "ListItems";
pub const LIST_FEEDS: &str = "ListFeeds";
pub const DELETE_ITEM: &str = "DeleteItem";

/// Operations the UI needs from the API service
#[async_trait]
pub trait PodcastApi: Send + Sync {
    async fn health_check(&self) -> Result<(), ClientError>;

    async fn add_items(&self, urls: &[String]) -> Result<(), ClientError>;

    async fn list_items(&self) -> Result<Degradable<Vec<PodcastItem>>, ClientError>;

    async fn list_feeds(&self) -> Result<Degradable<Vec<String>>, ClientError>;

    async fn delete_item(&self, feed: &str, item_id: &str) -> Result<(), ClientError>;

    /// Current state of the breaker guarding the API service
    fn circuit_state(&self) -> CircuitState;

    /// Public RSS link for the feed an audio file belongs to
    fn feed_link(&self, host: &str, feeds_path: &str, file_path: &str) -> String {
        feed_link(host, feeds_path, file_path)
    }
}

/// Build `http://{host}/{feeds_path}/{feed}/rss.xml`, where the feed is the
/// name of the directory containing `file_path`.
///
/// `host` is the externally reachable API address, not the internal base URL
/// the client talks to.
pub fn feed_link(host: &str, feeds_path: &str, file_path: &str) -> String {
    let feed = Path::new(file_path)
        .parent()
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .unwrap_or(".");
    format!(
        "http://{}/{}/{}/rss.xml",
        host,
        feeds_path.trim_matches('/'),
        feed
    )
}

/// HTTP client for the API service.
///
/// Every call runs as `breaker.call(retry.run_with_backoff(request))`: the
/// breaker sees one outcome per logical operation, after retries. Read
/// operations degrade to an empty result when the breaker refuses the call.
#[derive(Debug)]
pub struct ResilientClient {
    base_url: Url,
    http: reqwest::Client,
    breaker: CircuitBreaker,
    retry: RetryExecutor,
}

impl ResilientClient {
    /// Create a client; `timeout` applies to each attempt separately
    pub fn new(
        base_url: &str,
        timeout: Duration,
        breaker: CircuitBreakerConfig,
        retry: RetryConfig,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidRequest(format!("invalid base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidRequest(format!(
                "base URL cannot have paths: {}",
                base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::InvalidRequest(format!("failed to build HTTP client: {}", e)))?;

        info!(
            base_url = %base_url,
            timeout_ms = timeout.as_millis() as u64,
            max_retries = retry.max_retries,
            "Creating API client"
        );

        Ok(Self {
            breaker: CircuitBreaker::new(base_url.as_str(), breaker),
            retry: RetryExecutor::new(retry),
            base_url,
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidRequest(format!("invalid base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// One attempt: send the request and hand back the body of a 200 response
    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Bytes, ClientError> {
        let response = request.send().await.map_err(|e| {
            warn!(operation, error = %e, "Request to API service failed");
            ClientError::Transport(e)
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(
                operation,
                status = status.as_u16(),
                body = %body,
                "API service returned error status"
            );
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?)
    }

    /// Breaker around retries around one request/decode cycle
    async fn execute<T, B, D>(&self, operation: &str, build: B, decode: D) -> Result<T, ClientError>
    where
        T: Send,
        B: Fn() -> RequestBuilder + Sync,
        D: Fn(Bytes) -> Result<T, ClientError> + Sync,
    {
        let result = self
            .breaker
            .call(|| {
                self.retry.run_with_backoff(operation, || async {
                    let body = self.send(operation, build()).await?;
                    decode(body).map_err(|e| {
                        warn!(operation, error = %e, "Failed to decode API response");
                        e
                    })
                })
            })
            .await;

        if let Err(e) = &result {
            warn!(
                operation,
                state = %self.breaker.state(),
                error = %e,
                "Operation failed"
            );
        }
        result
    }

    fn degrade<T: Default>(
        &self,
        operation: &str,
        result: Result<T, ClientError>,
    ) -> Result<Degradable<T>, ClientError> {
        match result {
            Ok(data) => Ok(Degradable::fresh(data)),
            Err(e) if e.is_breaker_rejection() => {
                warn!(
                    operation,
                    state = %self.breaker.state(),
                    "API service not attempted, returning empty result"
                );
                metrics::record_degraded_response(operation);
                Ok(Degradable::degraded(
                    T::default(),
                    ClientError::GracefulDegradation {
                        operation: operation.to_string(),
                        source: Box::new(e),
                    },
                ))
            }
            Err(e) => Err(e),
        }
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(body: Bytes) -> Result<T, ClientError> {
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl PodcastApi for ResilientClient {
    async fn health_check(&self) -> Result<(), ClientError> {
        let url = self.endpoint(&["v1", "health"])?;
        self.execute(HEALTH_CHECK, || self.http.get(url.clone()), |_| Ok(()))
            .await?;
        debug!("HealthCheck completed successfully");
        Ok(())
    }

    async fn add_items(&self, urls: &[String]) -> Result<(), ClientError> {
        let url = self.endpoint(&["v1", "addItems"])?;
        let payload = serde_json::to_vec(&AddItemsRequest {
            urls: urls.to_vec(),
        })
        .map_err(|e| ClientError::InvalidRequest(format!("failed to encode request: {}", e)))?;

        self.execute(
            ADD_ITEMS,
            || {
                self.http
                    .post(url.clone())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(payload.clone())
            },
            |_| Ok(()),
        )
        .await?;

        info!(count = urls.len(), "AddItems completed successfully");
        Ok(())
    }

    async fn list_items(&self) -> Result<Degradable<Vec<PodcastItem>>, ClientError> {
        let url = self.endpoint(&["v1", "items"])?;
        let result = self
            .execute(LIST_ITEMS, || self.http.get(url.clone()), decode_json::<Vec<PodcastItem>>)
            .await;
        if let Ok(items) = &result {
            debug!(count = items.len(), "ListItems completed successfully");
        }
        self.degrade(LIST_ITEMS, result)
    }

    async fn list_feeds(&self) -> Result<Degradable<Vec<String>>, ClientError> {
        let url = self.endpoint(&["v1", "feeds"])?;
        let result = self
            .execute(LIST_FEEDS, || self.http.get(url.clone()), decode_json::<Vec<String>>)
            .await;
        if let Ok(feeds) = &result {
            debug!(count = feeds.len(), "ListFeeds completed successfully");
        }
        self.degrade(LIST_FEEDS, result)
    }

    async fn delete_item(&self, feed: &str, item_id: &str) -> Result<(), ClientError> {
        let url = self.endpoint(&["v1", "feeds", feed, item_id])?;
        self.execute(DELETE_ITEM, || self.http.delete(url.clone()), |_| Ok(()))
            .await?;
        info!(feed, item_id, "DeleteItem completed successfully");
        Ok(())
    }

    fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> ResilientClient {
        ResilientClient::new(
            base_url,
            Duration::from_secs(5),
            CircuitBreakerConfig::default(),
            RetryConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let c = client("http://api-service:8080");
        assert_eq!(
            c.endpoint(&["v1", "health"]).unwrap().as_str(),
            "http://api-service:8080/v1/health"
        );

        let prefixed = client("http://api-service:8080/backend/");
        assert_eq!(
            prefixed.endpoint(&["v1", "feeds"]).unwrap().as_str(),
            "http://api-service:8080/backend/v1/feeds"
        );
    }

    #[test]
    fn test_endpoint_encodes_path_segments() {
        let c = client("http://api-service:8080");
        let url = c.endpoint(&["v1", "feeds", "my feed", "a/b"]).unwrap();
        assert_eq!(url.path(), "/v1/feeds/my%20feed/a%2Fb");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ResilientClient::new(
            "not a url",
            Duration::from_secs(1),
            CircuitBreakerConfig::default(),
            RetryConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[test]
    fn test_feed_link_uses_parent_directory() {
        let cases = [
            (
                "localhost:8080",
                "v1/feeds",
                "/app/resources/testfeed/audio.mp3",
                "http://localhost:8080/v1/feeds/testfeed/rss.xml",
            ),
            (
                "api.example.com:8080",
                "v1/feeds",
                "/app/resources/myfeed/episode.mp3",
                "http://api.example.com:8080/v1/feeds/myfeed/rss.xml",
            ),
            (
                "localhost:8080",
                "v1/feeds",
                "/app/resources/my feed/audio.mp3",
                "http://localhost:8080/v1/feeds/my feed/rss.xml",
            ),
            (
                "localhost:8080",
                "/v1/feeds/",
                "/app/resources/category/feedname/episode.mp3",
                "http://localhost:8080/v1/feeds/feedname/rss.xml",
            ),
        ];

        for (host, feeds_path, file_path, expected) in cases {
            assert_eq!(feed_link(host, feeds_path, file_path), expected);
        }
    }

    #[test]
    fn test_feed_link_ignores_internal_base_url() {
        let c = client("http://internal-service:8080");
        let link = c.feed_link("podcasts.example.com", "v1/feeds", "/data/show/ep.mp3");
        assert_eq!(link, "http://podcasts.example.com/v1/feeds/show/rss.xml");
    }

    #[tokio::test]
    async fn test_starts_closed() {
        let c = client("http://127.0.0.1:9");
        assert_eq!(c.circuit_state(), CircuitState::Closed);
        assert_eq!(c.breaker_snapshot().total_calls, 0);
    }
}
