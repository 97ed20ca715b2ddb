//! Error types for the core crate
//!
//! This module provides a consolidated error type for the core crate and the
//! semantic errors raised while evaluating caller-supplied table queries.

use thiserror::Error;

/// Semantic errors of the tabular query engine
///
/// Every variant originates from an untrusted query structure and is reported
/// back to the caller inside the `counts = -1` envelope, never as a crash.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A condition or join refers to a `pos_field` column that does not exist
    #[error("column {field} does not exist in dataset {pos}")]
    UnknownColumn {
        /// Dataset position of the reference
        pos: String,
        /// Column name of the reference
        field: String,
    },

    /// A table cell could not be parsed as the requested numeric type
    #[error("value {value} cannot be parsed as {kind}: the column might not be numeric, compare as string instead")]
    NonNumericCell {
        /// Offending cell value
        value: String,
        /// Requested numeric kind
        kind: String,
    },

    /// A condition bound could not be parsed as the requested numeric type
    #[error("condition value {value} cannot be parsed as {kind}: change the condition type")]
    NonNumericBound {
        /// Offending condition value
        value: String,
        /// Requested numeric kind
        kind: String,
    },

    /// A `regexp` condition carries an invalid pattern
    #[error("invalid regular expression in condition: {0}")]
    BadRegex(String),

    /// The operator is not supported for the value type
    #[error("operator {op} is not supported for {kind} values")]
    UnsupportedOperator {
        /// Operator as written by the caller
        op: String,
        /// Value type of the condition
        kind: String,
    },

    /// The value type of a condition is not one of string/int/float
    #[error("type {kind} of column {field} is not supported")]
    UnsupportedType {
        /// Column name
        field: String,
        /// Value type as written by the caller
        kind: String,
    },

    /// Two shards of the same dataset carry different headers
    #[error("header of shard {shard} differs from header of shard {first}")]
    HeaderMismatch {
        /// First shard of the dataset
        first: String,
        /// Mismatching shard
        shard: String,
    },

    /// A shard row does not have as many cells as the header
    #[error("row at line {line} of shard {shard} has {found} cells, header has {expected}")]
    RaggedRow {
        /// Shard locator
        shard: String,
        /// One-based line number
        line: usize,
        /// Header width
        expected: usize,
        /// Cells found on the row
        found: usize,
    },

    /// A shard locator has no payload in the supplied content map
    #[error("no content supplied for shard {0}")]
    MissingShard(String),

    /// A dataset was listed without any shard
    #[error("dataset list contains an empty shard group")]
    EmptyDataset,

    /// The join conditions do not form a tree over the datasets
    #[error("join conditions contain a cycle or a disconnected dataset")]
    JoinGraphNotTree,

    /// A join step would connect two datasets that are both outside the joined result
    #[error("join condition set contains an un-joined dataset")]
    UnjoinedDataset,

    /// Join count does not match dataset count
    #[error("join condition count must equal dataset count minus one (datasets: {datasets}, joins: {joins})")]
    JoinCountMismatch {
        /// Number of datasets
        datasets: usize,
        /// Number of join conditions
        joins: usize,
    },

    /// A join condition refers to a dataset that was not supplied
    #[error("join condition refers to unknown dataset {0}")]
    UnknownJoinDataset(String),

    /// Only INNER joins are supported
    #[error("join type {0} is not supported")]
    UnsupportedJoinType(String),

    /// `queryConcatType` is neither `single` nor `multi`
    #[error("query concat type {0} is not supported")]
    UnknownConcatType(String),

    /// The query JSON could not be decoded
    #[error("failed to parse query item: {0}")]
    MalformedQuery(String),
}

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// Query semantic error
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A record failed validation
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Result type for the core crate
pub type Result<T> = std::result::Result<T, CoreError>;
