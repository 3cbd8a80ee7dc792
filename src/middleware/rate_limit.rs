//! Per-client request limiting.
//!
//! A single instance counts in process with `governor`. When a Redis URL is
//! configured the count is a fixed one-minute window shared by every instance.
//! Redis errors let the request through.
//!
//! Clients are keyed by peer address. `x-forwarded-for` is only honoured when
//! the service runs behind a proxy that overwrites it, since any client can set
//! the header itself.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter as Governor};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::services::Job;

const WINDOW_SECONDS: i64 = 60;

#[derive(Clone)]
enum Backend {
    Local(Arc<DefaultKeyedRateLimiter<String>>),
    Redis {
        client: Client,
        conn: Arc<Mutex<Option<MultiplexedConnection>>>,
        limit: u32,
    },
}

#[derive(Clone)]
pub struct RateLimiter {
    backend: Backend,
    trust_forwarded_for: bool,
}

impl RateLimiter {
    pub fn local(per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            backend: Backend::Local(Arc::new(Governor::keyed(Quota::per_minute(per_minute)))),
            trust_forwarded_for: false,
        }
    }

    pub fn redis(redis_url: &str, per_minute: u32) -> Result<Self, redis::RedisError> {
        let client = Client::open(redis_url)?;
        Ok(Self {
            backend: Backend::Redis {
                client,
                conn: Arc::new(Mutex::new(None)),
                limit: per_minute.max(1),
            },
            trust_forwarded_for: false,
        })
    }

    /// Uses Redis when a URL is given and it parses, the in-process limiter otherwise.
    pub fn from_settings(redis_url: Option<&str>, per_minute: u32) -> Self {
        match redis_url {
            Some(url) => match Self::redis(url, per_minute) {
                Ok(limiter) => limiter,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid rate limit Redis URL, limiting in process");
                    Self::local(per_minute)
                }
            },
            None => Self::local(per_minute),
        }
    }

    /// Keys clients by the first `x-forwarded-for` hop instead of the peer address.
    pub fn trusting_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    /// True when `key` may make another request now.
    pub async fn check(&self, key: &str) -> bool {
        match &self.backend {
            Backend::Local(limiter) => limiter.check_key(&key.to_string()).is_ok(),
            Backend::Redis { client, conn, limit } => match consume(client, conn, key).await {
                Ok(count) => count <= *limit,
                Err(e) => {
                    tracing::warn!(error = %e, "Rate limit store unavailable, allowing request");
                    true
                }
            },
        }
    }

    /// Drops in-process entries whose quota has fully replenished. Redis keys
    /// expire on their own.
    pub fn prune(&self) {
        if let Backend::Local(limiter) = &self.backend {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    /// Number of clients currently tracked in process.
    pub fn tracked_clients(&self) -> usize {
        match &self.backend {
            Backend::Local(limiter) => limiter.len(),
            Backend::Redis { .. } => 0,
        }
    }

    fn client_key(&self, req: &Request<Body>) -> String {
        let forwarded = if self.trust_forwarded_for {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        } else {
            None
        };
        forwarded
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Counts one request in the current window on a shared connection. A failed
/// command drops the connection so the next request reconnects.
async fn consume(
    client: &Client,
    cached: &Mutex<Option<MultiplexedConnection>>,
    key: &str,
) -> Result<u32, redis::RedisError> {
    let mut conn = {
        let mut slot = cached.lock().await;
        match slot.as_ref() {
            Some(conn) => conn.clone(),
            None => {
                let conn = client.get_multiplexed_async_connection().await?;
                *slot = Some(conn.clone());
                conn
            }
        }
    };

    let window = chrono::Utc::now().timestamp() / WINDOW_SECONDS;
    let usage_key = format!("ratelimit:{}:{}", key, window);
    let result: Result<u32, redis::RedisError> = async {
        let count: u32 = conn.incr(&usage_key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(&usage_key, WINDOW_SECONDS).await?;
        }
        Ok(count)
    }
    .await;

    if result.is_err() {
        cached.lock().await.take();
    }
    result
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next<Body>,
) -> Response {
    let key = limiter.client_key(&req);
    if !limiter.check(&key).await {
        tracing::warn!(client = %key, path = %req.uri().path(), "Rate limit exceeded");
        return AppError::RateLimited.into_response();
    }
    next.run(req).await
}

/// Periodically forgets idle clients so the in-process limiter stays bounded.
pub struct RateLimitPruneJob {
    limiter: RateLimiter,
    schedule: String,
}

impl RateLimitPruneJob {
    pub fn new(limiter: RateLimiter, schedule: String) -> Self {
        Self { limiter, schedule }
    }
}

#[async_trait]
impl Job for RateLimitPruneJob {
    fn name(&self) -> &str {
        "rate_limit_prune"
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    async fn execute(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let before = self.limiter.tracked_clients();
        self.limiter.prune();
        tracing::debug!(before, after = self.limiter.tracked_clients(), "Rate limiter pruned");
        Ok(())
    }
}
