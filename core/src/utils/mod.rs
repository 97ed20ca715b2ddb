//! Utility functions and helpers
//!
//! This module provides the bucket assignment rules shared by the index
//! writer and the search planner, plus helpers used throughout the codebase.

pub mod bitmap;

pub use bitmap::{bitop_and, bitop_or, get_bit, set_bit, set_bit_offsets};

use uuid::Uuid;

use crate::models::buckets::{AGE_BUCKET_SIZE, HASH_BUCKET_COUNT};

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of a byte string
pub fn fnv1a_32(data: &[u8]) -> u32 {
    data.iter().fold(FNV32_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV32_PRIME)
    })
}

/// Bucket of a string attribute value
pub fn hash_bucket(value: &str) -> u32 {
    fnv1a_32(value.as_bytes()) % HASH_BUCKET_COUNT
}

/// Bucket of an age value; `[0,10)` is bucket 0
pub fn age_bucket(age: i64) -> i64 {
    age.div_euclid(AGE_BUCKET_SIZE)
}

/// Age buckets covering an inclusive range
pub fn age_buckets_for_range(start: i64, end: i64) -> std::ops::RangeInclusive<i64> {
    age_bucket(start)..=age_bucket(end)
}

/// Generate a unique identifier for per-call scratch keys
pub fn scratch_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Intersect two transaction-id lists, keeping the order of `right`
pub fn intersect_ids(left: &[String], right: &[String]) -> Vec<String> {
    let members: std::collections::HashSet<&str> = left.iter().map(String::as_str).collect();
    right
        .iter()
        .filter(|id| members.contains(id.as_str()))
        .cloned()
        .collect()
}
