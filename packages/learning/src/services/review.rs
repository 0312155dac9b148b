//! Cache-first lookup of material reviews.
//!
//! Reviews live in the reviews service. A cache miss publishes a request and
//! answers `None` straight away; the reply arrives later on the inbound
//! queue and is stored with a fixed time-to-live.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::mq::{MaterialRef, Operation};
use dashmap::DashMap;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::services::relay::NotificationRelay;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("Cached value is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait ReviewCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    async fn set_with_ttl(&self, key: &str, value: &Value, ttl: Duration)
    -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
}

/// Redis-backed cache; values are stored as JSON strings with `SET ... EX`.
pub struct RedisReviewCache {
    manager: ConnectionManager,
}

impl RedisReviewCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl ReviewCache for RedisReviewCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(key).await?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &Value,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let encoded = serde_json::to_string(value)?;
        conn.set_ex::<_, _, ()>(key, encoded, ttl.as_secs()).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }
}

/// In-process cache, for single-instance deployments without Redis.
#[derive(Default)]
pub struct MemoryReviewCache {
    entries: DashMap<String, (Value, Instant)>,
}

impl MemoryReviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .and_then(|entry| (entry.1 > now).then(|| entry.0.clone()));
        if value.is_none() {
            self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        value
    }
}

#[async_trait]
impl ReviewCache for MemoryReviewCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.live(key))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &Value,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), (value.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.live(key).is_some())
    }
}

#[derive(Clone)]
pub struct ReviewService {
    cache: Arc<dyn ReviewCache>,
    relay: NotificationRelay,
    reviews_service: String,
    ttl: Duration,
}

impl ReviewService {
    pub fn new(
        cache: Arc<dyn ReviewCache>,
        relay: NotificationRelay,
        reviews_service: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            relay,
            reviews_service: reviews_service.into(),
            ttl,
        }
    }

    /// Cached review for `material_id`, or `None` after requesting it.
    ///
    /// A cache error is treated as a miss.
    pub async fn get_review(&self, material_id: &str) -> Option<Value> {
        match self.cache.get(material_id).await {
            Ok(Some(review)) => return Some(review),
            Ok(None) => debug!(material_id, "Review cache miss"),
            Err(e) => warn!(material_id, error = %e, "Review cache unavailable, treating as miss"),
        }

        self.relay
            .notify(
                &self.reviews_service,
                Operation::RequestMaterialReviews,
                &MaterialRef {
                    material_id: material_id.to_string(),
                },
            )
            .await;
        None
    }

    /// Store a review delivered by the reviews service.
    pub async fn store_review(&self, material_id: &str, review: &Value) -> Result<(), CacheError> {
        self.cache.set_with_ttl(material_id, review, self.ttl).await?;
        info!(material_id, ttl_secs = self.ttl.as_secs(), "Cached material review");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingPublisher;
    use serde_json::json;

    const FIVE_HOURS: Duration = Duration::from_secs(5 * 60 * 60);

    fn service() -> (ReviewService, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = NotificationRelay::new(publisher.clone());
        let service = ReviewService::new(
            Arc::new(MemoryReviewCache::new()),
            relay,
            "reviews-microservice",
            FIVE_HOURS,
        );
        (service, publisher)
    }

    #[tokio::test(start_paused = true)]
    async fn review_round_trip_through_cache() {
        let (service, publisher) = service();

        assert_eq!(service.get_review("m1").await, None);
        let sent = publisher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "reviews-microservice");
        assert_eq!(sent[0].1.operation_id, "requestMaterialReviews");
        assert_eq!(sent[0].1.message, json!({ "materialId": "m1" }));

        let review = json!({ "rating": 4.5, "count": 12 });
        service.store_review("m1", &review).await.unwrap();

        tokio::time::advance(FIVE_HOURS - Duration::from_secs(1)).await;
        assert_eq!(service.get_review("m1").await, Some(review));
        assert_eq!(publisher.sent().len(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(service.get_review("m1").await, None);
        assert_eq!(publisher.sent().len(), 2);
    }

    #[tokio::test]
    async fn repeated_misses_each_request_again() {
        let (service, publisher) = service();
        assert_eq!(service.get_review("m2").await, None);
        assert_eq!(service.get_review("m2").await, None);
        assert_eq!(publisher.sent().len(), 2);
    }

    #[tokio::test]
    async fn miss_still_answers_when_bus_is_down() {
        let (service, publisher) = service();
        publisher.fail(true);
        assert_eq!(service.get_review("m3").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn memory_cache_expires_entries() {
        let cache = MemoryReviewCache::new();
        cache
            .set_with_ttl("k", &json!(1), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(cache.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!cache.exists("k").await.unwrap());
        assert!(cache.entries.is_empty());
    }
}
