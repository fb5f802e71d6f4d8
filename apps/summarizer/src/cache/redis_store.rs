//! Durable `TtlStore` on Redis.
//!
//! First-writer-wins is delegated to Redis itself: `SET key value NX PX ttl` only stores the
//! value if the key is absent (Redis has already dropped expired keys), atomically.
//!
//! The connection is a `ConnectionManager`: after Redis restarts or the socket drops, the
//! failing call reports `Unavailable` and the manager reconnects for the calls that follow.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client as RedisClient;
use tokio::sync::OnceCell;
use tracing::info;

use crate::cache::{CacheError, TtlStore};

pub struct RedisStore {
    client: RedisClient,
    connection: OnceCell<ConnectionManager>,
}

/// Reconnect attempts per established-connection failure, with exponential backoff.
const RECONNECT_RETRIES: usize = 2;
const RECONNECT_BACKOFF_BASE: u64 = 2;
const RECONNECT_BACKOFF_FACTOR_MS: u64 = 100;

impl RedisStore {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            connection: OnceCell::new(),
        }
    }

    /// Connects lazily; a failed first connect is retried on the next call rather than
    /// cached. Once established, the manager handles reconnects itself.
    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.connection
            .get_or_try_init(|| async {
                let conn = ConnectionManager::new_with_backoff(
                    self.client.clone(),
                    RECONNECT_BACKOFF_BASE,
                    RECONNECT_BACKOFF_FACTOR_MS,
                    RECONNECT_RETRIES,
                )
                .await
                .map_err(unavailable)?;
                info!("Redis cache connection established");
                Ok::<_, CacheError>(conn)
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl TtlStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(reply.is_some())
    }
}

/// Redis rejects a zero expiry, so sub-millisecond TTLs round up to 1ms.
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

fn unavailable(e: redis::RedisError) -> CacheError {
    CacheError::Unavailable(e.to_string())
}
