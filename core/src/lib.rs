//! # MedChain Index Core
//!
//! Core data structures and pure logic for MedChain Index.
//! This crate provides the record and query models, the bucket and bitmap
//! math shared by the index writer and the search planner, and the tabular
//! query/join engine. Nothing in here performs I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod models;
pub mod query;
pub mod utils;

/// Re-export common types for ease of use
pub use error::{CoreError, QueryError, Result};
pub use models::{Block, IndexedAttribute, MedicalRecord, QueryItem, Transaction, TxParameter};
pub use query::{QueryResult, Table};

/// Version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
