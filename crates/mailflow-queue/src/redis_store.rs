//! Redis list store
//!
//! Ready jobs live in a Redis list per lane (`LPUSH`/`RPOP`), delayed jobs in a
//! sorted set scored by availability time. Promotion runs as a Lua script so
//! that concurrent workers never move the same entry twice.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::info;

use crate::backend::QueueError;
use crate::list::{ListQueue, ListStore};

const PROMOTE_SCRIPT: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, entry in ipairs(due) do
    redis.call('LPUSH', KEYS[2], entry)
end
if #due > 0 then
    redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
end
return #due
";

impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        QueueError::Connectivity(e.to_string())
    }
}

/// [`ListStore`] backed by a Redis server
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    promote: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RedisStore")
    }
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`)
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)
            .map_err(|e| QueueError::Configuration(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %redact(url), "Connected to Redis queue store");

        Ok(Self {
            conn,
            promote: Script::new(PROMOTE_SCRIPT),
        })
    }
}

/// Hide the password part of a redis url in logs
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***{}", &url[..scheme], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[async_trait]
impl ListStore for RedisStore {
    fn driver(&self) -> &'static str {
        "redis"
    }

    async fn push_ready(&self, key: &str, entry: String) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(key)
            .arg(entry)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn schedule(&self, key: &str, score_ms: i64, entry: String) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score_ms)
            .arg(entry)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn promote_due(
        &self,
        delayed_key: &str,
        ready_key: &str,
        now_ms: i64,
    ) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let moved: i64 = self
            .promote
            .key(delayed_key)
            .key(ready_key)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(usize::try_from(moved).unwrap_or(0))
    }

    async fn pop_ready(&self, key: &str) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();
        let entry: Option<String> = redis::cmd("RPOP").arg(key).query_async(&mut conn).await?;
        Ok(entry)
    }

    async fn ready_len(&self, key: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(())
    }
}

/// List-backed queue stored in Redis
pub type RedisQueue = ListQueue<RedisStore>;

impl ListQueue<RedisStore> {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, QueueError> {
        Ok(ListQueue::new(RedisStore::connect(url).await?, prefix))
    }
}
