//! Query execution and result envelope
//!
//! `run` never fails: every semantic error is reported inside the result
//! envelope with `counts = -1` so that callers can correct their request.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::condition::matches_any;
use super::join::{join_all, order};
use super::table::{aggregate, Table};
use crate::error::QueryError;
use crate::models::{ConcatType, QueryItem};

/// Message of a successful single-dataset query
pub const SINGLE_SUCCESS_MESSAGE: &str = "query succeeded";

/// Message of a successful joined query
pub const JOIN_SUCCESS_MESSAGE: &str = "join query succeeded";

/// One projected row, column key to cell
pub type ResultRow = BTreeMap<String, String>;

/// Result envelope returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Row count, `-1` on error
    pub counts: i64,

    /// Projected rows
    pub data: Vec<ResultRow>,

    /// Success message or error detail
    pub message: String,
}

impl QueryResult {
    /// Create a successful result
    pub fn success(data: Vec<ResultRow>, message: &str) -> Self {
        QueryResult {
            counts: data.len() as i64,
            data,
            message: message.to_string(),
        }
    }

    /// Create an error result
    pub fn error(err: &QueryError) -> Self {
        QueryResult {
            counts: -1,
            data: Vec::new(),
            message: err.to_string(),
        }
    }

    /// Whether the result carries an error
    pub fn is_error(&self) -> bool {
        self.counts < 0
    }

    /// Serialize the envelope to JSON text
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"counts":-1,"data":[],"message":"result serialization failed"}"#.to_string()
        })
    }
}

/// Run a query over decrypted shard contents keyed by locator
pub fn run(item: &QueryItem, payloads: &HashMap<String, String>) -> QueryResult {
    match try_run(item, payloads) {
        Ok(result) => result,
        Err(err) => {
            warn!("Query failed: {}", err);
            QueryResult::error(&err)
        }
    }
}

/// Run a query given as raw JSON text
pub fn run_query_json(text: &str, payloads: &HashMap<String, String>) -> QueryResult {
    match QueryItem::from_json(text) {
        Ok(item) => run(&item, payloads),
        Err(err) => QueryResult::error(&err),
    }
}

/// Run a query, surfacing semantic errors
pub fn try_run(item: &QueryItem, payloads: &HashMap<String, String>) -> Result<QueryResult, QueryError> {
    match item.concat_type()? {
        ConcatType::Single => {
            let shards = item.file_pos.first().ok_or(QueryError::EmptyDataset)?;
            let table = aggregate(shards, payloads)?;
            let rows = select(item, &table, false)?;
            Ok(QueryResult::success(rows, SINGLE_SUCCESS_MESSAGE))
        }
        ConcatType::Multi => {
            if item.file_pos.len() != item.joint_conditions.len() + 1 {
                return Err(QueryError::JoinCountMismatch {
                    datasets: item.file_pos.len(),
                    joins: item.joint_conditions.len(),
                });
            }

            let mut tables = HashMap::with_capacity(item.file_pos.len());
            for shards in &item.file_pos {
                let pos = shards.first().ok_or(QueryError::EmptyDataset)?;
                tables.insert(pos.clone(), aggregate(shards, payloads)?);
            }

            let ordered = order(&item.joint_conditions)?;
            let joined = join_all(&ordered, &tables)?;
            debug!("Joined table has {} columns and {} rows", joined.width(), joined.row_count());

            let rows = select(item, &joined, true)?;
            Ok(QueryResult::success(rows, JOIN_SUCCESS_MESSAGE))
        }
    }
}

/// Dataset position of a `pos_field` key
fn key_pos(key: &str) -> &str {
    key.split('_').next().unwrap_or("")
}

/// Column name of a `pos_field` key
fn key_field(key: &str) -> &str {
    key.split_once('_').map(|(_, field)| field).unwrap_or(key)
}

/// Filter rows and project the requested columns
fn select(item: &QueryItem, table: &Table, keep_prefix: bool) -> Result<Vec<ResultRow>, QueryError> {
    let explicit: HashSet<&str> = item.return_field.iter().map(String::as_str).collect();
    let wildcards: HashSet<&str> = item
        .return_field
        .iter()
        .filter(|field| key_field(field) == "*")
        .map(|field| key_pos(field))
        .collect();

    let projected: Vec<(usize, String)> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, key)| explicit.contains(key.as_str()) || wildcards.contains(key_pos(key)))
        .map(|(index, key)| {
            let name = if keep_prefix { key.clone() } else { key_field(key).to_string() };
            (index, name)
        })
        .collect();

    let mut rows = Vec::new();
    for row in &table.rows {
        if !matches_any(row, &table.header, &item.query_conditions)? {
            continue;
        }
        rows.push(
            projected
                .iter()
                .map(|(index, name)| (name.clone(), row.get(*index).cloned().unwrap_or_default()))
                .collect(),
        );
    }
    Ok(rows)
}
