use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;

/// Token ids (`jti`) signed out before their expiry.
#[async_trait]
pub trait TokenRevocationList: Send + Sync {
    /// Remembers `jti` until `expires_at`; after that the token is rejected on
    /// expiry alone.
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<()>;

    async fn is_revoked(&self, jti: &str) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

fn revoked_key(jti: &str) -> String {
    format!("auth:revoked:{}", jti)
}

pub struct RedisRevocationList {
    redis: ConnectionManager,
}

impl RedisRevocationList {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl TokenRevocationList for RedisRevocationList {
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let ttl = (expires_at - Utc::now()).num_seconds();
        if ttl <= 0 {
            return Ok(());
        }

        let mut conn = self.redis.clone();
        redis::cmd("SETEX")
            .arg(revoked_key(jti))
            .arg(ttl)
            .arg(1)
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to store revoked token")?;
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let mut conn = self.redis.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(revoked_key(jti))
            .query_async(&mut conn)
            .await
            .context("Failed to query revoked tokens")?;
        Ok(exists)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        tokio::time::timeout(
            Duration::from_secs(1),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .context("Redis timeout after 1s")?
        .context("Redis PING failed")?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRevocationList {
    revoked: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryRevocationList {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenRevocationList for InMemoryRevocationList {
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let mut revoked = self.revoked.write().await;
        let now = Utc::now();
        revoked.retain(|_, until| *until > now);
        if expires_at > now {
            revoked.insert(jti.to_string(), expires_at);
        }
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let revoked = self.revoked.read().await;
        Ok(matches!(revoked.get(jti), Some(until) if *until > Utc::now()))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
