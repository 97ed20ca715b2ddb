//! Data models for MedChain Index
//!
//! This module provides data structures for ledger blocks and transactions,
//! the medical records extracted from them, and the query items evaluated by
//! the tabular engine.

mod block;
mod query_item;
mod record;

pub use block::{Block, Transaction, TxParameter};
pub use query_item::{CompareOp, ConcatType, Condition, JoinType, JointCondition, QueryItem, ValueKind};
pub use record::{parse_age, IndexedAttribute, MedicalRecord, RecordFields, STRING_ATTRIBUTES};

/// Domain constants for medical records
pub mod domains {
    /// Required prefix of every in-scope domain identifier
    pub const DOMAIN_PREFIX: &str = "DOMAIN_";

    /// Build a domain identifier from a bare domain name
    pub fn domain_id_for(name: &str) -> String {
        format!("{}{}", DOMAIN_PREFIX, name.trim())
    }

    /// Check whether a domain identifier is in scope
    pub fn is_in_scope(domain_id: &str) -> bool {
        !domain_id.is_empty() && domain_id.starts_with(DOMAIN_PREFIX)
    }
}

/// Bucket constants shared by the index writer and the search planner.
///
/// These values are baked into existing bitmap keys and must not change.
pub mod buckets {
    /// Width of one age bucket: `[0,10)` is bucket 0
    pub const AGE_BUCKET_SIZE: i64 = 10;

    /// Modulus applied to the 32-bit string hash
    pub const HASH_BUCKET_COUNT: u32 = 100;

    /// Largest age bound a search may carry
    pub const MAX_SEARCH_AGE: i64 = 200;
}
