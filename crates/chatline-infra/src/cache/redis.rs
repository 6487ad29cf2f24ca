//! Redis cache backend.
//!
//! Holds one multiplexed async connection, opened lazily and reopened after
//! a failure, so the service starts (with the cache Down) even when Redis is
//! not reachable yet. Expiry is delegated to Redis (`SET ... PX`).

use std::time::Duration;

use chatline_core::cache::CacheBackend;
use chatline_types::error::CacheError;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::debug;

/// `CacheBackend` over a Redis server.
pub struct RedisCacheBackend {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisCacheBackend {
    /// Parse `url` without connecting.
    pub fn new(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        debug!("redis connection established");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection so the next call reconnects.
    async fn reset(&self) {
        *self.connection.lock().await = None;
    }

    async fn run<T: redis::FromRedisValue>(&self, cmd: redis::Cmd) -> Result<T, CacheError> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<T> = cmd.query_async(&mut conn).await;
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_io_error() || err.is_connection_dropped() {
                    self.reset().await;
                }
                Err(unavailable(err))
            }
        }
    }
}

fn unavailable(err: redis::RedisError) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

impl CacheBackend for RedisCacheBackend {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run::<Option<String>>(cmd).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64);
        self.run::<()>(cmd).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let removed = self.run::<i64>(cmd).await?;
        Ok(removed > 0)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut cmd = redis::cmd("KEYS");
        cmd.arg(format!("{prefix}*"));
        let mut keys: Vec<String> = self.run::<Vec<String>>(cmd).await?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let pong = self.run::<String>(redis::cmd("PING")).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheError::Unavailable(format!("unexpected PING reply: {pong}")))
        }
    }
}
