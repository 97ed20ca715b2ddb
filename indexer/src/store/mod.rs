//! Key-value store seam
//!
//! The index lives in a remote key-value store with Redis semantics: byte
//! string bitmaps, sorted sets and hashes. Everything the indexer needs from
//! the store goes through [`IndexStore`].

use async_trait::async_trait;

use crate::error::Result;

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// One write of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Set a hash field
    HSet {
        /// Hash key
        key: String,
        /// Field name
        field: String,
        /// Field value
        value: String,
    },

    /// Add a sorted-set member
    ZAdd {
        /// Sorted-set key
        key: String,
        /// Member
        member: String,
        /// Score
        score: i64,
    },

    /// Set one bit of a bitmap
    SetBit {
        /// Bitmap key
        key: String,
        /// Bit offset
        offset: u64,
    },
}

/// An ordered batch of writes sent in one round trip.
///
/// A batch is not atomic across keys: a failure part way through may leave
/// a prefix of the writes applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a hash field write
    pub fn hset(&mut self, key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) {
        self.ops.push(WriteOp::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        });
    }

    /// Queue a sorted-set insertion
    pub fn zadd(&mut self, key: impl Into<String>, member: impl Into<String>, score: i64) {
        self.ops.push(WriteOp::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        });
    }

    /// Queue a bit set
    pub fn setbit(&mut self, key: impl Into<String>, offset: u64) {
        self.ops.push(WriteOp::SetBit {
            key: key.into(),
            offset,
        });
    }

    /// Queued writes in order
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Operations the indexer needs from the key-value store
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Apply a batch of writes in order
    async fn apply(&self, batch: &WriteBatch) -> Result<()>;

    /// Store the bitwise OR of `sources` at `dest`; missing sources are empty
    async fn bitop_or(&self, dest: &str, sources: &[String]) -> Result<()>;

    /// Store the bitwise AND of `sources` at `dest`; missing sources are empty
    async fn bitop_and(&self, dest: &str, sources: &[String]) -> Result<()>;

    /// Read a bitmap; a missing key yields an empty byte string
    async fn get_bitmap(&self, key: &str) -> Result<Vec<u8>>;

    /// Members of a sorted set scored within `[min, max]`, ascending by score
    async fn zrange_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>>;

    /// Read one hash field
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Delete keys; missing keys are ignored
    async fn del(&self, keys: &[String]) -> Result<()>;
}
