//! Response cache: Redis when reachable, in-process otherwise
//!
//! The backend is chosen once at startup. `connect` probes Redis with a
//! short timeout and a PING; if either fails the cache silently runs on a
//! local in-memory store for the rest of the process. After startup,
//! `get`/`put` never surface errors: a failing remote call downgrades to a
//! miss (or a dropped write) and logs the condition.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::llm::{LLMResponse, QueryRequest};

/// Default entry lifetime: 2 days
pub const DEFAULT_TTL_SECS: u64 = 60 * 60 * 24 * 2;

const LOCAL_CAPACITY: u64 = 1024;

enum Backend {
    Redis(MultiplexedConnection),
    Local(moka::sync::Cache<String, String>),
}

/// Key-value store for serialized [`LLMResponse`] values
pub struct QueryCache {
    backend: Backend,
    ttl: Duration,
}

impl QueryCache {
    /// Connect to the configured backend, degrading to local on failure.
    ///
    /// Never fails: the worst outcome is an in-process cache whose entries
    /// die with the run.
    pub async fn connect(config: &CacheConfig) -> Self {
        let ttl = Duration::from_secs(config.ttl_secs);

        if !config.enabled {
            debug!("cache: remote backend disabled, using local");
            return Self::local_with_ttl(ttl);
        }

        match probe_redis(config).await {
            Ok(conn) => {
                info!(host = %config.host, port = config.port, "cache: connected to redis");
                Self {
                    backend: Backend::Redis(conn),
                    ttl,
                }
            }
            Err(e) => {
                warn!(error = %e, "cache: redis unavailable, falling back to local");
                Self::local_with_ttl(ttl)
            }
        }
    }

    /// In-process cache with the default TTL
    pub fn local() -> Self {
        Self::local_with_ttl(Duration::from_secs(DEFAULT_TTL_SECS))
    }

    fn local_with_ttl(ttl: Duration) -> Self {
        let cache = moka::sync::Cache::builder()
            .max_capacity(LOCAL_CAPACITY)
            .time_to_live(ttl)
            .build();
        Self {
            backend: Backend::Local(cache),
            ttl,
        }
    }

    /// Name of the active backend, for response metadata
    pub fn backend(&self) -> &'static str {
        match self.backend {
            Backend::Redis(_) => "redis",
            Backend::Local(_) => "local",
        }
    }

    pub async fn healthcheck(&self) -> bool {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                redis::cmd("PING").query_async::<String>(&mut conn).await.is_ok()
            }
            Backend::Local(_) => true,
        }
    }

    /// Look up a response; any backend error is a miss
    pub async fn get(&self, key: &str) -> Option<LLMResponse> {
        let raw = match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                match conn.get::<_, Option<String>>(key).await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(error = %e, "cache get failed, treating as miss");
                        return None;
                    }
                }
            }
            Backend::Local(cache) => cache.get(key),
        }?;

        match serde_json::from_str(&raw) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(error = %e, "cache entry undecodable, treating as miss");
                None
            }
        }
    }

    /// Store a response under `key` with the configured TTL; errors are
    /// logged and dropped
    pub async fn put(&self, key: &str, response: &LLMResponse) {
        let raw = match serde_json::to_string(response) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "cache put skipped: response not serializable");
                return;
            }
        };

        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                if let Err(e) = conn.set_ex::<_, _, ()>(key, raw, self.ttl.as_secs()).await {
                    warn!(error = %e, "cache put failed");
                }
            }
            Backend::Local(cache) => cache.insert(key.to_string(), raw),
        }
    }
}

async fn probe_redis(config: &CacheConfig) -> Result<MultiplexedConnection, redis::RedisError> {
    let url = match &config.password {
        Some(password) => format!("redis://:{}@{}:{}", password, config.host, config.port),
        None => format!("redis://{}:{}", config.host, config.port),
    };
    let timeout = Duration::from_millis(config.connect_timeout_ms);

    let client = redis::Client::open(url)?;
    let mut conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
        .await
        .map_err(|_| redis::RedisError::from((redis::ErrorKind::IoError, "connection timed out")))??;

    tokio::time::timeout(timeout, redis::cmd("PING").query_async::<String>(&mut conn))
        .await
        .map_err(|_| redis::RedisError::from((redis::ErrorKind::IoError, "ping timed out")))??;

    Ok(conn)
}

/// Deterministic cache key over the fields that pin a query's output.
///
/// NUL separators keep adjacent fields from colliding across boundaries;
/// the `repoquery:v1:` prefix versions the key schema.
pub fn request_key(request: &QueryRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.model.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.content.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.system_prompt.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.max_tokens.to_le_bytes());
    format!("repoquery:v1:{:x}", hasher.finalize())
}
