//! Payload collaborators
//!
//! Encrypted table payloads live in a content-addressed blob store and are
//! decrypted with a key recovered from the record's envelope. Both are
//! external systems reached through the traits below.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{IndexerError, Result};

/// Content-addressed blob storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the blob stored under `locator`
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>>;

    /// Store a blob and return its locator
    async fn store(&self, content: Vec<u8>) -> Result<String>;
}

/// Turns an encrypted payload into table text
#[async_trait]
pub trait PayloadDecryptor: Send + Sync {
    /// Decrypt `ciphertext` using the key sealed in `envelope`
    async fn decrypt(&self, ciphertext: &[u8], envelope: &str) -> Result<String>;
}

/// In-memory [`BlobStore`] keyed by locator
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    next_id: RwLock<u64>,
}

impl MemoryBlobStore {
    /// Create an empty blob store
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a blob under a caller-chosen locator
    pub async fn insert(&self, locator: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.blobs.write().await.insert(locator.into(), content.into());
    }

    /// Number of stored blobs
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Check if no blobs are stored
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(locator)
            .cloned()
            .ok_or_else(|| IndexerError::Payload(format!("blob {} not found", locator)))
    }

    async fn store(&self, content: Vec<u8>) -> Result<String> {
        let mut next_id = self.next_id.write().await;
        *next_id += 1;
        let locator = format!("mem-{}", *next_id);
        self.blobs.write().await.insert(locator.clone(), content);
        Ok(locator)
    }
}

/// Treats payloads as unencrypted UTF-8 text
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextDecryptor;

#[async_trait]
impl PayloadDecryptor for PlaintextDecryptor {
    async fn decrypt(&self, ciphertext: &[u8], _envelope: &str) -> Result<String> {
        String::from_utf8(ciphertext.to_vec())
            .map_err(|e| IndexerError::Payload(format!("payload is not valid UTF-8: {}", e)))
    }
}
