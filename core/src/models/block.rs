//! Ledger block representation
//!
//! This module provides data structures for committed ledger blocks and the
//! contract-invocation transactions they carry.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use serde::{Serialize, Deserialize};

/// A named parameter of a contract invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxParameter {
    /// Parameter name
    pub key: String,

    /// Parameter value, UTF-8 decoded
    pub value: String,
}

impl TxParameter {
    /// Create a new parameter
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        TxParameter {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A committed contract-invocation transaction
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction identifier
    #[serde(rename = "txId")]
    pub tx_id: String,

    /// Invoked contract method, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Invocation parameters in ledger order
    #[serde(default)]
    pub parameters: Vec<TxParameter>,
}

impl Debug for Transaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Transaction")
            .field("tx_id", &self.tx_id)
            .field("method", &self.method)
            .field("parameters", &self.parameters.iter().map(|p| &p.key).collect::<Vec<_>>())
            .finish()
    }
}

impl Transaction {
    /// Create a new transaction
    pub fn new(tx_id: impl Into<String>, parameters: Vec<TxParameter>) -> Self {
        Transaction {
            tx_id: tx_id.into(),
            method: None,
            parameters,
        }
    }

    /// Get the first parameter with the given name
    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Get the first parameter matching any of the given names, in parameter order
    pub fn param_any(&self, keys: &[&str]) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| keys.contains(&p.key.as_str()))
            .map(|p| p.value.as_str())
    }

    /// Whether the transaction carries no parameters at all
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// A committed block; consumed once by the index builder and discarded
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height, the bit offset in every bitmap layer
    pub height: u64,

    /// Transactions in ledger order
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Debug for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Block")
            .field("height", &self.height)
            .field("transaction_count", &self.transactions.len())
            .finish()
    }
}

impl Block {
    /// Create a new block
    pub fn new(height: u64, transactions: Vec<Transaction>) -> Self {
        Block {
            height,
            transactions,
        }
    }

    /// Number of transactions
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}
