//! Redis-backed index store

use async_trait::async_trait;
use log::{debug, info};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

use super::{IndexStore, WriteBatch, WriteOp};
use crate::config::RedisConfig;
use crate::error::{IndexerError, Result};

/// [`IndexStore`] over a multiplexed Redis connection
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let timeout = Duration::from_secs(config.connect_timeout_secs);

        let connection = tokio::time::timeout(timeout, client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| IndexerError::Store(format!("Timed out connecting to {}", config.url)))??;

        info!("Connected to key-value store at {}", config.url);
        Ok(Self { connection })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

#[async_trait]
impl IndexStore for RedisStore {
    async fn apply(&self, batch: &WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // Pipelined, not MULTI/EXEC
        let mut pipe = redis::pipe();
        for op in batch.ops() {
            match op {
                WriteOp::HSet { key, field, value } => {
                    pipe.hset(key, field, value).ignore();
                }
                WriteOp::ZAdd { key, member, score } => {
                    pipe.zadd(key, member, *score).ignore();
                }
                WriteOp::SetBit { key, offset } => {
                    pipe.setbit(key, *offset as usize, true).ignore();
                }
            }
        }

        let mut conn = self.conn();
        let _: () = pipe.query_async(&mut conn).await?;
        debug!("Applied batch of {} writes", batch.len());
        Ok(())
    }

    async fn bitop_or(&self, dest: &str, sources: &[String]) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.bit_or(dest, sources).await?;
        Ok(())
    }

    async fn bitop_and(&self, dest: &str, sources: &[String]) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.bit_and(dest, sources).await?;
        Ok(())
    }

    async fn get_bitmap(&self, key: &str) -> Result<Vec<u8>> {
        let mut conn = self.conn();
        let bytes: Option<Vec<u8>> = conn.get(key).await?;
        Ok(bytes.unwrap_or_default())
    }

    async fn zrange_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.zrangebyscore(key, min, max).await?;
        Ok(members)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let _: () = conn.del(keys).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let config = RedisConfig {
            url: "not a redis url".to_string(),
            ..Default::default()
        };
        let err = RedisStore::connect(&config).await.unwrap_err();
        assert!(matches!(err, IndexerError::Store(_)));
    }
}
