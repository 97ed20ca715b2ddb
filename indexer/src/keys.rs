//! Persisted key layout
//!
//! Existing indexes depend on these exact key shapes:
//!
//! - `idx:domain:<domainId>`: bitmap of block heights touching the domain
//! - `idx:bucket:<attr>:<bucket>`: bitmap of block heights touching the bucket
//! - `idx:blk:<height>:age:zset`: sorted set of txIds scored by age
//! - `idx:blk:<height>:<attr>:hash`: hash of value to a JSON array of txIds
//!
//! Scratch keys created by the search planner live under `tmp:search:`.

use medchain_index_core::IndexedAttribute;

/// Builds keys under an optional deployment prefix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    /// Create a layout; an empty prefix yields the bare key shapes
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn key(&self, body: String) -> String {
        if self.prefix.is_empty() {
            body
        } else {
            format!("{}{}", self.prefix, body)
        }
    }

    /// Domain bitmap key
    pub fn domain(&self, domain_id: &str) -> String {
        self.key(format!("idx:domain:{}", domain_id))
    }

    /// Bucket bitmap key
    pub fn bucket(&self, attribute: IndexedAttribute, bucket: impl std::fmt::Display) -> String {
        self.key(format!("idx:bucket:{}:{}", attribute.key_name(), bucket))
    }

    /// Per-block age sorted set key
    pub fn block_age_zset(&self, height: u64) -> String {
        self.key(format!("idx:blk:{}:age:zset", height))
    }

    /// Per-block exact-value hash key
    pub fn block_hash(&self, height: u64, attribute: IndexedAttribute) -> String {
        self.key(format!("idx:blk:{}:{}:hash", height, attribute.key_name()))
    }

    /// Scratch key of one search step
    pub fn scratch(&self, search_id: &str, step: &str) -> String {
        self.key(format!("tmp:search:{}:{}", search_id, step))
    }
}
