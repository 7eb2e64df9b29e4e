//! Redis-backed key-value store using `bb8-redis` connection pooling.
//!
//! # Design
//!
//! - `commit` ships the whole batch to one server-side Lua script. Redis runs
//!   scripts without interleaving other commands, so the precondition checks
//!   and the writes form a single atomic unit across every key involved.
//! - `next_id` uses `INCR`, which starts missing counters at 1.
//! - Pool checkout respects the configured connection timeout and maps
//!   failures to [`StoreError::Connection`].

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{Pool, PooledConnection};
use bb8_redis::redis::{self, RedisError, Script};
use tracing::debug;

use crate::domain::TraceId;
use crate::domain::ports::{AtomicBatch, KeyValueStore, Mutation, Precondition, StoreError};

// ARGV[1] holds the precondition count. KEYS lists precondition keys first,
// then mutation keys, and ARGV carries one tag per entry plus the value for
// `equals` and `put`. Returns 0 on success or the 1-based index of the first
// failed precondition.
const COMMIT_SCRIPT: &str = r"
local conditions = tonumber(ARGV[1])
local arg = 2
for i = 1, conditions do
  local current = redis.call('GET', KEYS[i])
  if ARGV[arg] == 'absent' then
    if current then
      return i
    end
    arg = arg + 1
  else
    if current ~= ARGV[arg + 1] then
      return i
    end
    arg = arg + 2
  end
end
for i = conditions + 1, #KEYS do
  if ARGV[arg] == 'put' then
    redis.call('SET', KEYS[i], ARGV[arg + 1])
    arg = arg + 2
  else
    redis.call('DEL', KEYS[i])
    arg = arg + 1
  end
end
return 0
";

const TAG_ABSENT: &[u8] = b"absent";
const TAG_EQUALS: &[u8] = b"equals";
const TAG_PUT: &[u8] = b"put";
const TAG_DELETE: &[u8] = b"delete";

/// Configuration for the Redis connection pool.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use user_registry::outbound::kv::RedisPoolConfig;
///
/// let config = RedisPoolConfig::new("redis://127.0.0.1:6379")
///     .with_max_size(20)
///     .with_min_idle(Some(5))
///     .with_connection_timeout(Duration::from_secs(5));
/// assert_eq!(config.redis_url(), "redis://127.0.0.1:6379");
/// ```
#[derive(Debug, Clone)]
pub struct RedisPoolConfig {
    redis_url: String,
    max_size: u32,
    min_idle: Option<u32>,
    connection_timeout: Duration,
}

impl RedisPoolConfig {
    /// Create a new configuration with the given Redis URL.
    ///
    /// Uses defaults of 10 connections, 2 idle connections, and a 30 second
    /// checkout timeout.
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            max_size: 10,
            min_idle: Some(2),
            connection_timeout: Duration::from_secs(30),
        }
    }

    /// Set the maximum number of connections in the pool.
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the minimum number of idle connections to maintain.
    pub fn with_min_idle(mut self, min_idle: Option<u32>) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Set the connection checkout timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Get the Redis URL.
    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }
}

/// Async connection pool for Redis.
#[derive(Clone)]
pub struct RedisPool {
    inner: Pool<RedisConnectionManager>,
}

impl RedisPool {
    /// Create a new connection pool with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the URL is invalid or the pool
    /// cannot be built.
    pub async fn new(config: RedisPoolConfig) -> Result<Self, StoreError> {
        let manager = RedisConnectionManager::new(config.redis_url.as_str())
            .map_err(|err| StoreError::connection(err.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(config.min_idle)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .map_err(|err| StoreError::connection(err.to_string()))?;

        Ok(Self { inner: pool })
    }

    /// Get a connection from the pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if a connection cannot be obtained
    /// within the configured timeout.
    pub async fn get(&self) -> Result<PooledConnection<'_, RedisConnectionManager>, StoreError> {
        self.inner
            .get()
            .await
            .map_err(|err| StoreError::connection(err.to_string()))
    }
}

/// Key-value store backed by a Redis server.
pub struct RedisStore {
    pool: RedisPool,
    commit_script: Script,
}

impl RedisStore {
    /// Create a store over an existing pool.
    pub fn new(pool: RedisPool) -> Self {
        Self {
            pool,
            commit_script: Script::new(COMMIT_SCRIPT),
        }
    }
}

/// Script keys and arguments for one batch, laid out for [`COMMIT_SCRIPT`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScriptCall {
    keys: Vec<String>,
    args: Vec<Vec<u8>>,
}

fn encode_batch(preconditions: &[Precondition], mutations: &[Mutation]) -> ScriptCall {
    let mut keys = Vec::with_capacity(preconditions.len() + mutations.len());
    let mut args = vec![preconditions.len().to_string().into_bytes()];

    for precondition in preconditions {
        keys.push(precondition.key().to_owned());
        match precondition {
            Precondition::Absent { .. } => args.push(TAG_ABSENT.to_vec()),
            Precondition::Equals { value, .. } => {
                args.push(TAG_EQUALS.to_vec());
                args.push(value.clone());
            }
        }
    }

    for mutation in mutations {
        keys.push(mutation.key().to_owned());
        match mutation {
            Mutation::Put { value, .. } => {
                args.push(TAG_PUT.to_vec());
                args.push(value.clone());
            }
            Mutation::Delete { .. } => args.push(TAG_DELETE.to_vec()),
        }
    }

    ScriptCall { keys, args }
}

fn map_redis_error(error: &RedisError) -> StoreError {
    let message = error.to_string();
    debug!(
        trace_id = ?TraceId::current(),
        %message,
        "redis operation failed"
    );
    if error.is_io_error() || error.is_connection_refusal() || error.is_connection_dropped() {
        StoreError::connection(message)
    } else {
        StoreError::backend(message)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.pool.get().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(|err| map_redis_error(&err))
    }

    async fn next_id(&self, sequence: &str) -> Result<i64, StoreError> {
        let mut conn = self.pool.get().await?;
        redis::cmd("INCR")
            .arg(sequence)
            .query_async(&mut *conn)
            .await
            .map_err(|err| map_redis_error(&err))
    }

    async fn commit(&self, batch: AtomicBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let (preconditions, mutations) = batch.into_parts();
        let call = encode_batch(&preconditions, &mutations);

        let mut invocation = self.commit_script.prepare_invoke();
        for key in &call.keys {
            invocation.key(key.as_str());
        }
        for arg in &call.args {
            invocation.arg(arg.as_slice());
        }

        let mut conn = self.pool.get().await?;
        let failed: i64 = invocation
            .invoke_async(&mut *conn)
            .await
            .map_err(|err| map_redis_error(&err))?;

        if failed == 0 {
            return Ok(());
        }
        let key = usize::try_from(failed - 1)
            .ok()
            .and_then(|index| preconditions.get(index))
            .map(|precondition| precondition.key().to_owned())
            .ok_or_else(|| {
                StoreError::backend(format!("commit script returned unknown index {failed}"))
            })?;
        Err(StoreError::precondition_failed(key))
    }
}
