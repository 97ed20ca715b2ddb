//! Ledger collaborator seam
//!
//! The indexer only needs two things from the ledger: a push stream of
//! committed blocks and a point lookup of transactions by id.

use async_trait::async_trait;
use tokio::sync::mpsc;

use medchain_index_core::models::{Block, Transaction};

use crate::error::{IndexerError, Result};

pub mod http;

pub use http::HttpLedgerClient;

/// Where a block subscription starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// The newest committed block
    Latest,
    /// A specific block height
    Height(u64),
}

impl StartPosition {
    /// Parse `latest` or a block height
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("latest") {
            return Ok(StartPosition::Latest);
        }
        value
            .parse()
            .map(StartPosition::Height)
            .map_err(|_| IndexerError::Config(format!("invalid start position: {}", value)))
    }
}

/// One item of a block subscription
#[derive(Debug, Clone, PartialEq)]
pub enum BlockEvent {
    /// A committed block
    Block(Block),
    /// A payload that could not be decoded into a block
    Malformed(String),
}

/// Receiving end of a block subscription; closes when the stream ends
pub type BlockStream = mpsc::Receiver<BlockEvent>;

/// Operations consumed from the ledger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Subscribe to committed blocks
    async fn subscribe_blocks(&self, start: StartPosition) -> Result<BlockStream>;

    /// Look up a committed transaction by id
    async fn get_transaction(&self, tx_id: &str) -> Result<Option<Transaction>>;
}
