//! In-process store with Redis semantics
//!
//! Used by tests and by the `--memory-store` development mode. Bitmaps use
//! the same byte layout as Redis `SETBIT`, and `BITOP` zero-pads shorter
//! operands.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use medchain_index_core::utils::{bitop_and, bitop_or, set_bit};

use super::{IndexStore, WriteBatch, WriteOp};
use crate::error::{to_store_error, IndexerError, Result};

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Hash(BTreeMap<String, String>),
    SortedSet(HashMap<String, i64>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Bytes(_) => "string",
            Value::Hash(_) => "hash",
            Value::SortedSet(_) => "zset",
        }
    }
}

fn wrong_type(key: &str, value: &Value) -> IndexerError {
    to_store_error(format!(
        "WRONGTYPE operation against key {} holding a {}",
        key,
        value.type_name()
    ))
}

/// In-memory [`IndexStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys currently present, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keys starting with `prefix`, sorted
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.keys()
            .await
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect()
    }

    /// Deterministic rendering of every key and value
    pub async fn snapshot(&self) -> Vec<(String, String)> {
        let data = self.data.read().await;
        let mut entries: Vec<(String, String)> = data
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::Bytes(bytes) => format!("{:?}", bytes),
                    Value::Hash(hash) => format!("{:?}", hash),
                    Value::SortedSet(set) => {
                        let mut members: Vec<_> = set.iter().map(|(m, s)| (*s, m.clone())).collect();
                        members.sort();
                        format!("{:?}", members)
                    }
                };
                (key.clone(), rendered)
            })
            .collect();
        entries.sort();
        entries
    }

    fn bytes_of<'a>(data: &'a HashMap<String, Value>, key: &str) -> Result<&'a [u8]> {
        match data.get(key) {
            None => Ok(&[]),
            Some(Value::Bytes(bytes)) => Ok(bytes.as_slice()),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    async fn bitop(&self, dest: &str, sources: &[String], op: fn(&[&[u8]]) -> Vec<u8>) -> Result<()> {
        let mut data = self.data.write().await;
        let inputs = sources
            .iter()
            .map(|key| Self::bytes_of(&data, key))
            .collect::<Result<Vec<_>>>()?;
        let result = op(&inputs);

        // An empty result deletes the destination, like Redis
        if result.is_empty() {
            data.remove(dest);
        } else {
            data.insert(dest.to_string(), Value::Bytes(result));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn apply(&self, batch: &WriteBatch) -> Result<()> {
        let mut data = self.data.write().await;
        for op in batch.ops() {
            match op {
                WriteOp::HSet { key, field, value } => {
                    let entry = data
                        .entry(key.clone())
                        .or_insert_with(|| Value::Hash(BTreeMap::new()));
                    match entry {
                        Value::Hash(hash) => {
                            hash.insert(field.clone(), value.clone());
                        }
                        other => return Err(wrong_type(key, other)),
                    }
                }
                WriteOp::ZAdd { key, member, score } => {
                    let entry = data
                        .entry(key.clone())
                        .or_insert_with(|| Value::SortedSet(HashMap::new()));
                    match entry {
                        Value::SortedSet(set) => {
                            set.insert(member.clone(), *score);
                        }
                        other => return Err(wrong_type(key, other)),
                    }
                }
                WriteOp::SetBit { key, offset } => {
                    let entry = data
                        .entry(key.clone())
                        .or_insert_with(|| Value::Bytes(Vec::new()));
                    match entry {
                        Value::Bytes(bytes) => set_bit(bytes, *offset),
                        other => return Err(wrong_type(key, other)),
                    }
                }
            }
        }
        Ok(())
    }

    async fn bitop_or(&self, dest: &str, sources: &[String]) -> Result<()> {
        self.bitop(dest, sources, bitop_or).await
    }

    async fn bitop_and(&self, dest: &str, sources: &[String]) -> Result<()> {
        self.bitop(dest, sources, bitop_and).await
    }

    async fn get_bitmap(&self, key: &str) -> Result<Vec<u8>> {
        let data = self.data.read().await;
        Ok(Self::bytes_of(&data, key)?.to_vec())
    }

    async fn zrange_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>> {
        let data = self.data.read().await;
        let set = match data.get(key) {
            None => return Ok(Vec::new()),
            Some(Value::SortedSet(set)) => set,
            Some(other) => return Err(wrong_type(key, other)),
        };

        let mut members: Vec<(i64, &String)> = set
            .iter()
            .filter(|(_, score)| (min..=max).contains(*score))
            .map(|(member, score)| (*score, member))
            .collect();
        members.sort();
        Ok(members.into_iter().map(|(_, member)| member.clone()).collect())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let data = self.data.read().await;
        match data.get(key) {
            None => Ok(None),
            Some(Value::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        let mut data = self.data.write().await;
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }
}
