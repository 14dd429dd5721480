//! Redis-backed signal store

use super::SignalStore;
use crate::config::SignalConfig;
use crate::Error;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::FromRedisValue;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Signal store shared between processes through Redis.
///
/// Each stop request is a `SET <prefix>:<chat_id> 1 EX <ttl>` key. The
/// connection is established on first use and re-established by the
/// connection manager after failures.
pub struct RedisSignalStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    key_prefix: String,
    ttl: Duration,
    timeout: Duration,
}

impl RedisSignalStore {
    /// Create a store for the configured Redis URL without connecting
    pub fn new(config: &SignalConfig) -> crate::Result<Self> {
        let client = redis::Client::open(config.redis_url())?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            key_prefix: config.key_prefix.clone(),
            ttl: config.ttl(),
            timeout: config.timeout(),
        })
    }

    fn key(&self, chat_id: &str) -> String {
        format!("{}:{}", self.key_prefix, chat_id)
    }

    async fn connection(&self) -> crate::Result<ConnectionManager> {
        let connect = self.connection.get_or_try_init(|| async {
            let manager = ConnectionManager::new(self.client.clone()).await?;
            info!("Connected to Redis signal store");
            Ok::<_, redis::RedisError>(manager)
        });

        let manager = tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| {
                Error::Signal(format!("connecting to redis timed out after {:?}", self.timeout))
            })??;
        Ok(manager.clone())
    }

    async fn query<T: FromRedisValue>(&self, cmd: redis::Cmd) -> crate::Result<T> {
        let mut conn = self.connection().await?;
        let result = tokio::time::timeout(self.timeout, cmd.query_async::<_, T>(&mut conn))
            .await
            .map_err(|_| {
                Error::Signal(format!("redis command timed out after {:?}", self.timeout))
            })?;
        Ok(result?)
    }
}

#[async_trait]
impl SignalStore for RedisSignalStore {
    async fn set_stop(&self, chat_id: &str) -> crate::Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(chat_id))
            .arg(1)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1));
        self.query::<()>(cmd).await?;
        debug!("chat_id=<{}> | Stop signal set (ttl {:?})", chat_id, self.ttl);
        Ok(())
    }

    async fn check_stop(&self, chat_id: &str) -> crate::Result<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(self.key(chat_id));
        self.query::<bool>(cmd).await
    }

    async fn clear_stop(&self, chat_id: &str) -> crate::Result<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(self.key(chat_id));
        let removed = self.query::<i64>(cmd).await?;
        if removed > 0 {
            debug!("chat_id=<{}> | Stop signal cleared", chat_id);
        }
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.query::<String>(redis::cmd("PING"))
            .await
            .map(|reply| reply == "PONG")
            .unwrap_or(false)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
