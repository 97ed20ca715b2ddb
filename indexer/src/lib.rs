//! MedChain Indexer
//!
//! This crate keeps a multi-layer bitmap index of ledger transactions in a
//! Redis-compatible store and serves attribute searches and tabular queries
//! over it.

// Error types and result
pub mod error;
pub use error::{IndexerError, Result};

// Configuration
pub mod config;
pub use config::IndexerConfig;

// Persisted key layout and the store seam
pub mod keys;
pub mod store;
pub use keys::KeyLayout;
pub use store::{IndexStore, MemoryStore, RedisStore, WriteBatch};

// Ledger collaborator and block listener
pub mod ledger;
pub mod listener;
pub use ledger::{BlockEvent, HttpLedgerClient, LedgerClient, StartPosition};
pub use listener::{BlockListener, ListenerState};

// Write path
pub mod builder;
pub mod extractor;
pub use builder::{BlockIndexBatch, IndexBuilder};
pub use extractor::{extract_record, is_medical_transaction, ExtractionError};

// Read path
pub mod payload;
pub mod planner;
pub mod service;
pub use payload::{BlobStore, MemoryBlobStore, PayloadDecryptor, PlaintextDecryptor};
pub use planner::{SearchPlanner, SearchRequest};
pub use service::IndexService;
