//! Request admission control (fixed-window rate limiting).
//!
//! Every inbound request increments a per-client counter before any auth or
//! ledger work happens. The counter lives in a shared store so multiple
//! server processes enforce one combined limit; the window is fixed: the
//! expiry is set when the key is created and later hits do not extend it.
//!
//! The increment runs as read + compare-and-swap so two concurrent requests
//! on the same key cannot both observe a pre-limit count and both pass. A
//! lost swap is retried a bounded number of times; when contention exhausts
//! the budget the request is denied rather than waved through.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::sync::Mutex;

use crate::server::ServerState;

/// CAS attempts before a contended request is denied.
const CAS_ATTEMPTS: u32 = 3;

/// The counter store could not be reached or answered out of protocol.
#[derive(Debug)]
pub struct AdmissionError(String);

impl std::fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "admission store error: {}", self.0)
    }
}

impl std::error::Error for AdmissionError {}

impl From<redis::RedisError> for AdmissionError {
    fn from(err: redis::RedisError) -> Self {
        Self(err.to_string())
    }
}

/// Shared counter with expiry, the only state the limiter needs.
///
/// `compare_and_swap` must be atomic with respect to other writers of the
/// same key; `expected = None` means the key must not exist yet and the
/// window expiry starts at the swap.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Option<u64>, AdmissionError>;

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        next: u64,
        window: Duration,
    ) -> Result<bool, AdmissionError>;
}

/// In-process store for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn fetch(&self, key: &str) -> Result<Option<u64>, AdmissionError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((count, deadline)) if *deadline > Instant::now() => Ok(Some(*count)),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        next: u64,
        window: Duration,
    ) -> Result<bool, AdmissionError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let current = match entries.get(key) {
            Some((count, deadline)) if *deadline > now => Some(*count),
            _ => None,
        };
        if current != expected {
            return Ok(false);
        }
        match entries.get_mut(key) {
            // Keep the original deadline: the window is fixed.
            Some(entry) if current.is_some() => entry.0 = next,
            _ => {
                entries.insert(key.to_string(), (next, now + window));
            }
        }
        Ok(true)
    }
}

/// Redis-backed store shared across server processes.
#[derive(Clone)]
pub struct RedisCounterStore {
    manager: ConnectionManager,
    script: redis::Script,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> Result<Self, AdmissionError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::with_manager(manager))
    }

    pub fn with_manager(manager: ConnectionManager) -> Self {
        // GET + conditional SET in one script so the swap is atomic on the
        // server. An empty expected argument means "key must not exist";
        // only that branch sets the expiry, so the window stays fixed.
        let script = redis::Script::new(
            r#"
            local cur = redis.call('GET', KEYS[1])
            if (not cur and ARGV[1] == '') or (cur and cur == ARGV[1]) then
                if not cur then
                    redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
                else
                    redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
                end
                return 1
            end
            return 0
            "#,
        );
        Self { manager, script }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn fetch(&self, key: &str) -> Result<Option<u64>, AdmissionError> {
        let mut conn = self.manager.clone();
        let value: Option<u64> = conn.get(key).await?;
        Ok(value)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        next: u64,
        window: Duration,
    ) -> Result<bool, AdmissionError> {
        let mut conn = self.manager.clone();
        let expected_arg = expected.map(|v| v.to_string()).unwrap_or_default();
        let won: i64 = self
            .script
            .key(key)
            .arg(expected_arg)
            .arg(next.to_string())
            .arg(window.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(won == 1)
    }
}

/// Fixed-window limiter: at most `limit` admitted requests per key per
/// `window`. Denied requests still consume the slot they incremented.
pub struct RateLimiter {
    limit: u64,
    window: Duration,
    store: Box<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(limit: u64, window: Duration, store: Box<dyn CounterStore>) -> Self {
        Self {
            limit,
            window,
            store,
        }
    }

    /// Whether a request under `key` may proceed.
    pub async fn allow(&self, key: &str) -> Result<bool, AdmissionError> {
        for _ in 0..CAS_ATTEMPTS {
            let current = self.store.fetch(key).await?;
            let next = current.unwrap_or(0) + 1;
            if self
                .store
                .compare_and_swap(key, current, next, self.window)
                .await?
            {
                return Ok(next <= self.limit);
            }
        }

        // Contention exhausted the retry budget: fail closed.
        tracing::warn!(key, "admission CAS contention, denying request");
        Ok(false)
    }
}

/// Middleware gating every route, keyed by the client address.
pub async fn admit(
    State(state): State<ServerState>,
    connect_info: Result<ConnectInfo<SocketAddr>, axum::extract::rejection::ExtensionRejection>,
    request: Request,
    next: Next,
) -> Response {
    let ip = connect_info
        .ok()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let key = format!("rate_limit:{ip}");

    match state.limiter.allow(&key).await {
        Ok(true) => next.run(request).await,
        Ok(false) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(crate::Error {
                error: "too many requests, rate limit exceeded".to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            tracing::error!("admission store unavailable: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(crate::Error {
                    error: "admission unavailable".to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(limit: u64, window: Duration) -> RateLimiter {
        RateLimiter::new(limit, window, Box::new(MemoryCounterStore::new()))
    }

    #[tokio::test]
    async fn admits_up_to_limit_then_denies() {
        let limiter = limiter(5, Duration::from_secs(10));

        for _ in 0..5 {
            assert!(limiter.allow("client").await.unwrap());
        }
        assert!(!limiter.allow("client").await.unwrap());
    }

    #[tokio::test]
    async fn window_expiry_resets_the_counter() {
        let limiter = limiter(1, Duration::from_millis(50));

        assert!(limiter.allow("client").await.unwrap());
        assert!(!limiter.allow("client").await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.allow("client").await.unwrap());
    }

    #[tokio::test]
    async fn keys_do_not_interact() {
        let limiter = limiter(1, Duration::from_secs(10));

        assert!(limiter.allow("a").await.unwrap());
        assert!(limiter.allow("b").await.unwrap());
        assert!(!limiter.allow("a").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_requests_never_exceed_the_limit() {
        let limiter = Arc::new(limiter(5, Duration::from_secs(10)));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move { limiter.allow("client").await.unwrap() });
        }

        let mut admitted = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap() {
                admitted += 1;
            }
        }
        // Contended attempts may fail closed, never open.
        assert!(admitted <= 5);
    }

    /// Store whose swaps always lose, as under pathological contention.
    struct ContendedStore;

    #[async_trait]
    impl CounterStore for ContendedStore {
        async fn fetch(&self, _key: &str) -> Result<Option<u64>, AdmissionError> {
            Ok(Some(0))
        }

        async fn compare_and_swap(
            &self,
            _key: &str,
            _expected: Option<u64>,
            _next: u64,
            _window: Duration,
        ) -> Result<bool, AdmissionError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn exhausted_retries_fail_closed() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10), Box::new(ContendedStore));
        assert!(!limiter.allow("client").await.unwrap());
    }
}
