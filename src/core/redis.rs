use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, Client, RedisError};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::services::locks::{LockError, LockService, LockToken};

const RELEASE_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    end
    return 0
"#;

#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }
}

#[async_trait]
impl LockService for RedisHandle {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return Err(LockError::Unavailable);
        };

        let token = Uuid::new_v4().to_string();
        let ttl_ms = ttl.as_millis().clamp(1, i64::MAX as u128) as i64;

        let reply: Option<String> = cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut manager)
            .await?;

        Ok(reply.map(|_| LockToken::new(key, token)))
    }

    async fn release(&self, token: &LockToken) -> Result<bool, LockError> {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return Err(LockError::Unavailable);
        };

        let removed: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(token.key())
            .arg(token.value())
            .invoke_async(&mut manager)
            .await?;

        Ok(removed > 0)
    }
}
