use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::ports::Store;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DependencyStatus {
    fn healthy(since: Instant) -> Self {
        Self {
            status: "healthy".to_string(),
            latency_ms: Some(since.elapsed().as_millis() as u64),
            error: None,
        }
    }

    fn unhealthy(error: impl ToString) -> Self {
        Self {
            status: "unhealthy".to_string(),
            latency_ms: None,
            error: Some(error.to_string()),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
    fn name(&self) -> &'static str;
}

pub struct StoreChecker {
    store: Arc<dyn Store>,
}

impl StoreChecker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DependencyChecker for StoreChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.store.ping().await {
            Ok(()) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

/// Checks the Redis instance backing the shared rate limiter.
pub struct RedisChecker {
    url: String,
}

impl RedisChecker {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

#[async_trait]
impl DependencyChecker for RedisChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        let client = match redis::Client::open(self.url.as_str()) {
            Ok(client) => client,
            Err(e) => return DependencyStatus::unhealthy(e),
        };
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => return DependencyStatus::unhealthy(e),
        };
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

pub struct HealthChecker {
    checkers: Vec<Box<dyn DependencyChecker>>,
    start_time: Instant,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            checkers: Vec::new(),
            start_time: Instant::now(),
        }
    }

    pub fn add_checker(mut self, checker: Box<dyn DependencyChecker>) -> Self {
        self.checkers.push(checker);
        self
    }

    /// Healthy when every dependency is, degraded when some are, unhealthy when none are.
    pub async fn check_all(&self) -> HealthResponse {
        let mut dependencies = HashMap::new();
        let mut healthy_count = 0;

        for checker in &self.checkers {
            let status = timeout(CHECK_TIMEOUT, checker.check())
                .await
                .unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"));
            if status.status == "healthy" {
                healthy_count += 1;
            }
            dependencies.insert(checker.name().to_string(), status);
        }

        let overall_status = if healthy_count == self.checkers.len() {
            "healthy"
        } else if healthy_count > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        HealthResponse {
            status: overall_status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            dependencies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, bool);

    #[async_trait]
    impl DependencyChecker for Fixed {
        async fn check(&self) -> DependencyStatus {
            if self.1 {
                DependencyStatus::healthy(Instant::now())
            } else {
                DependencyStatus::unhealthy("down")
            }
        }

        fn name(&self) -> &'static str {
            self.0
        }
    }

    #[tokio::test]
    async fn test_overall_status() {
        let all = HealthChecker::new().add_checker(Box::new(Fixed("a", true)));
        assert_eq!(all.check_all().await.status, "healthy");

        let some = HealthChecker::new()
            .add_checker(Box::new(Fixed("a", true)))
            .add_checker(Box::new(Fixed("b", false)));
        let report = some.check_all().await;
        assert_eq!(report.status, "degraded");
        assert_eq!(report.dependencies["b"].error.as_deref(), Some("down"));

        let none = HealthChecker::new().add_checker(Box::new(Fixed("b", false)));
        assert_eq!(none.check_all().await.status, "unhealthy");
    }

    #[tokio::test]
    async fn test_store_checker_reports_memory_store_healthy() {
        let store: Arc<dyn Store> = Arc::new(crate::db::memory::MemoryStore::new());
        let checker = HealthChecker::new().add_checker(Box::new(StoreChecker::new(store)));
        assert_eq!(checker.check_all().await.status, "healthy");
    }
}
