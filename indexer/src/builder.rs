//! Index builder
//!
//! Turns one committed block into the writes of all three index layers:
//! domain bitmaps, attribute-bucket bitmaps and the block-local fine index.
//! Building is pure; flushing is one batched round trip to the store.

use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use medchain_index_core::models::{Block, IndexedAttribute, MedicalRecord, STRING_ATTRIBUTES};
use medchain_index_core::utils::{age_bucket, hash_bucket};

use crate::error::Result;
use crate::extractor::extract_record;
use crate::keys::KeyLayout;
use crate::store::{IndexStore, WriteBatch};

/// Writes for one block, ready to flush
#[derive(Debug, Clone, PartialEq)]
pub struct BlockIndexBatch {
    /// Block height
    pub height: u64,

    /// Records extracted from the block
    pub records: Vec<MedicalRecord>,

    /// Transactions skipped by the extractor
    pub skipped: usize,

    /// Ordered writes: hash fields, age set members, domain bits, bucket bits
    pub writes: WriteBatch,
}

impl BlockIndexBatch {
    /// Number of indexed records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// Builds and flushes per-block index writes
pub struct IndexBuilder {
    store: Arc<dyn IndexStore>,
    keys: KeyLayout,
}

impl IndexBuilder {
    /// Create a new builder
    pub fn new(store: Arc<dyn IndexStore>, keys: KeyLayout) -> Self {
        Self { store, keys }
    }

    /// Build the writes for a block without touching the store
    pub fn build(&self, block: &Block) -> BlockIndexBatch {
        let height = block.height;
        let mut records = Vec::new();
        let mut skipped = 0;

        let mut domains: BTreeSet<&str> = BTreeSet::new();
        let mut buckets: BTreeSet<String> = BTreeSet::new();
        let mut values: BTreeMap<IndexedAttribute, BTreeMap<String, Vec<String>>> = BTreeMap::new();

        for tx in &block.transactions {
            match extract_record(tx) {
                Ok(record) => records.push(record),
                Err(e) => {
                    debug!("Skipping tx {} in block {}: {}", tx.tx_id, height, e);
                    skipped += 1;
                }
            }
        }

        for record in &records {
            domains.insert(record.domain_id.as_str());
            buckets.insert(self.keys.bucket(IndexedAttribute::Age, age_bucket(record.age)));

            for attribute in STRING_ATTRIBUTES {
                let value = record.attribute_value(attribute);
                buckets.insert(self.keys.bucket(attribute, hash_bucket(&value)));

                // Empty values get a bucket bit but no exact-match entry
                if value.is_empty() {
                    continue;
                }
                let tx_ids = values.entry(attribute).or_default().entry(value).or_default();
                if !tx_ids.contains(&record.tx_id) {
                    tx_ids.push(record.tx_id.clone());
                }
            }
        }

        let mut writes = WriteBatch::new();
        for (attribute, by_value) in &values {
            let key = self.keys.block_hash(height, *attribute);
            for (value, tx_ids) in by_value {
                match serde_json::to_string(tx_ids) {
                    Ok(encoded) => writes.hset(key.clone(), value.clone(), encoded),
                    Err(e) => warn!("Failed to encode txIds for {} field {}: {}", key, value, e),
                }
            }
        }
        for record in &records {
            writes.zadd(self.keys.block_age_zset(height), record.tx_id.clone(), record.age);
        }
        for domain in domains {
            writes.setbit(self.keys.domain(domain), height);
        }
        for bucket in buckets {
            writes.setbit(bucket, height);
        }

        BlockIndexBatch {
            height,
            records,
            skipped,
            writes,
        }
    }

    /// Send a built batch to the store in one round trip
    pub async fn flush(&self, batch: &BlockIndexBatch) -> Result<()> {
        if batch.writes.is_empty() {
            debug!("Block {} has no medical records, nothing to flush", batch.height);
            return Ok(());
        }

        match self.store.apply(&batch.writes).await {
            Ok(()) => {
                info!(
                    "Indexed block {} ({} records, {} skipped)",
                    batch.height,
                    batch.record_count(),
                    batch.skipped
                );
                Ok(())
            }
            Err(e) => {
                error!("Error updating index for block {}: {}", batch.height, e);
                Err(e)
            }
        }
    }

    /// Build and flush a block
    pub async fn index_block(&self, block: &Block) -> Result<BlockIndexBatch> {
        let batch = self.build(block);
        self.flush(&batch).await?;
        Ok(batch)
    }
}
