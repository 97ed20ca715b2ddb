//! In-memory tables built from decrypted flat-file shards
//!
//! A shard is whitespace-delimited text whose first line is the header.
//! Every column is keyed as `<datasetPos>_<column>` so that columns of
//! different datasets never collide after a join.

use std::collections::{BTreeMap, HashMap};

use crate::error::QueryError;

/// Column key to column index
pub type HeaderMap = BTreeMap<String, usize>;

/// A parsed table with fixed-width rows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    /// Column key to column index
    pub header: HeaderMap,

    /// Column keys in index order
    pub columns: Vec<String>,

    /// Row cells, each row exactly `columns.len()` wide
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a column key
    pub fn column_index(&self, key: &str) -> Option<usize> {
        self.header.get(key).copied()
    }

    /// Render the table as space-joined text with a header line
    pub fn to_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push(self.columns.join(" "));
        lines.extend(self.rows.iter().map(|row| row.join(" ")));
        lines.join("\n")
    }
}

/// Parse the header line of a shard, prefixing every column with `pos`
pub fn parse_header(pos: &str, content: &str) -> Vec<String> {
    content
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .map(|column| format!("{}_{}", pos, column))
        .collect()
}

fn header_map(columns: &[String]) -> HeaderMap {
    columns
        .iter()
        .enumerate()
        .map(|(index, key)| (key.clone(), index))
        .collect()
}

fn parse_rows(shard: &str, content: &str, width: usize) -> Result<Vec<Vec<String>>, QueryError> {
    let mut rows = Vec::new();
    for (line_no, line) in content.lines().enumerate().skip(1) {
        let cells: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if cells.is_empty() {
            continue;
        }
        if cells.len() != width {
            return Err(QueryError::RaggedRow {
                shard: shard.to_string(),
                line: line_no + 1,
                expected: width,
                found: cells.len(),
            });
        }
        rows.push(cells);
    }
    Ok(rows)
}

/// Aggregate the shards of one dataset into a single table.
///
/// The first shard names the dataset position. Every other shard must carry
/// a header identical to the first one; its header line is dropped.
pub fn aggregate(shard_ids: &[String], contents: &HashMap<String, String>) -> Result<Table, QueryError> {
    let first = shard_ids.first().ok_or(QueryError::EmptyDataset)?;
    let first_content = contents
        .get(first)
        .ok_or_else(|| QueryError::MissingShard(first.clone()))?;

    let columns = parse_header(first, first_content);
    let header = header_map(&columns);
    let mut rows = parse_rows(first, first_content, columns.len())?;

    for shard in &shard_ids[1..] {
        let content = contents
            .get(shard)
            .ok_or_else(|| QueryError::MissingShard(shard.clone()))?;

        if header_map(&parse_header(first, content)) != header {
            return Err(QueryError::HeaderMismatch {
                first: first.clone(),
                shard: shard.clone(),
            });
        }
        rows.extend(parse_rows(shard, content, columns.len())?);
    }

    Ok(Table {
        header,
        columns,
        rows,
    })
}
