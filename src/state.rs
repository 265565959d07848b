use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: Option<PgPool>,
    pub http_client: reqwest::Client,
    pub report_cache: ReportCache,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = crate::db::build_pool(&config);
        if db_pool.is_none() {
            tracing::warn!(
                "WAREHOUSE_DB_URL / DATABASE_URL is not set — report endpoints will return 502"
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let report_cache = ReportCache::new(
            config.report_cache_max_entries as u64,
            Duration::from_secs(config.report_cache_ttl_seconds),
        );

        Ok(Self {
            config,
            db_pool,
            http_client,
            report_cache,
        })
    }
}

/// Time-boxed response cache for report endpoints.
///
/// Key is the query signature, value is the rendered JSON response.
/// Report data is recomputed from scratch on every refresh, so a stale
/// entry is at worst one refresh interval old. `key_lock` hands out a
/// per-key mutex so concurrent misses for the same signature compute
/// once instead of stampeding the warehouse.
#[derive(Clone)]
pub struct ReportCache {
    entries: Cache<String, Value>,
    key_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ReportCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            key_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).await
    }

    pub async fn put(&self, key: String, value: Value) {
        self.entries.insert(key, value).await;
    }

    pub async fn clear(&self) {
        self.entries.invalidate_all();
        self.key_locks.lock().await.clear();
    }

    pub async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        if locks.len() > 1024 {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::ReportCache;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn caches_and_clears() {
        let cache = ReportCache::new(10, Duration::from_secs(60));
        assert!(cache.get("k").await.is_none());
        cache.put("k".to_string(), json!({"rows": 1})).await;
        assert_eq!(cache.get("k").await, Some(json!({"rows": 1})));
        cache.clear().await;
        assert!(cache.get("k").await.is_none());
    }
}
