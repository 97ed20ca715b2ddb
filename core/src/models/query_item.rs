//! Query item representation
//!
//! A query item is the caller-supplied description of a tabular query: which
//! datasets to read, how to join them, which rows to keep and which columns
//! to return. Operators and types stay as written by the caller and are
//! parsed at evaluation time so that unsupported values surface as query
//! errors rather than decode failures.

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// One predicate over a `pos_field` column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
    /// Column name
    pub field: String,

    /// Dataset position the column belongs to
    pub pos: String,

    /// Comparison operator
    pub compare: String,

    /// Comparison bound
    pub val: String,

    /// Value type: string, int or float
    #[serde(rename = "type")]
    pub kind: String,
}

impl Condition {
    /// Create a new condition
    pub fn new(field: &str, pos: &str, compare: &str, val: &str, kind: &str) -> Self {
        Condition {
            field: field.to_string(),
            pos: pos.to_string(),
            compare: compare.to_string(),
            val: val.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Header key of the referenced column
    pub fn column_key(&self) -> String {
        format!("{}_{}", self.pos, self.field)
    }
}

/// A pairwise join between two datasets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointCondition {
    /// Left dataset position
    pub pos1: String,

    /// Left column
    pub field1: String,

    /// Right dataset position
    pub pos2: String,

    /// Right column
    pub field2: String,

    /// Comparison operator
    pub compare: String,

    /// Value type
    #[serde(rename = "type")]
    pub kind: String,

    /// Join type, only INNER is supported
    #[serde(rename = "jointType")]
    pub joint_type: String,
}

impl JointCondition {
    /// Create an INNER equality join
    pub fn inner(pos1: &str, field1: &str, pos2: &str, field2: &str, kind: &str) -> Self {
        JointCondition {
            pos1: pos1.to_string(),
            field1: field1.to_string(),
            pos2: pos2.to_string(),
            field2: field2.to_string(),
            compare: "eq".to_string(),
            kind: kind.to_string(),
            joint_type: "INNER".to_string(),
        }
    }
}

/// A complete tabular query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryItem {
    /// `single` or `multi`
    #[serde(rename = "queryConcatType")]
    pub query_concat_type: String,

    /// Condition groups: OR across groups, AND within a group
    #[serde(rename = "queryConditions")]
    pub query_conditions: Vec<Vec<Condition>>,

    /// One shard list per dataset; the first shard names the dataset position
    #[serde(rename = "filePos")]
    pub file_pos: Vec<Vec<String>>,

    /// Projected columns as `pos_field`, or `pos_*` for every column of a dataset
    #[serde(rename = "returnField")]
    pub return_field: Vec<String>,

    /// Join conditions for `multi` queries
    #[serde(rename = "jointConditions")]
    pub joint_conditions: Vec<JointCondition>,
}

impl QueryItem {
    /// Decode a query item from JSON text
    pub fn from_json(text: &str) -> Result<Self, QueryError> {
        serde_json::from_str(text).map_err(|e| QueryError::MalformedQuery(e.to_string()))
    }

    /// Parse the concat type
    pub fn concat_type(&self) -> Result<ConcatType, QueryError> {
        ConcatType::parse(&self.query_concat_type)
    }
}

/// How the datasets of a query are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatType {
    /// One dataset, possibly sharded
    Single,
    /// Several datasets joined left to right
    Multi,
}

impl ConcatType {
    /// Parse the wire value
    pub fn parse(value: &str) -> Result<Self, QueryError> {
        match value {
            "single" => Ok(ConcatType::Single),
            "multi" => Ok(ConcatType::Multi),
            other => Err(QueryError::UnknownConcatType(other.to_string())),
        }
    }
}

/// Value type of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Lexicographic string comparison
    String,
    /// 64-bit signed integer comparison
    Int,
    /// 64-bit float comparison
    Float,
}

impl ValueKind {
    /// Parse the wire value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "string" => Some(ValueKind::String),
            "int" => Some(ValueKind::Int),
            "float" => Some(ValueKind::Float),
            _ => None,
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater or equal
    Ge,
    /// Less or equal
    Le,
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Substring match (string only)
    Contain,
    /// Prefix match (string only)
    Prefix,
    /// Suffix match (string only)
    Suffix,
    /// Regular expression match (string only)
    Regexp,
}

impl CompareOp {
    /// Parse the wire value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "gt" => Some(CompareOp::Gt),
            "lt" => Some(CompareOp::Lt),
            "ge" => Some(CompareOp::Ge),
            "le" => Some(CompareOp::Le),
            "eq" => Some(CompareOp::Eq),
            "ne" => Some(CompareOp::Ne),
            "contain" => Some(CompareOp::Contain),
            "prefix" => Some(CompareOp::Prefix),
            "suffix" => Some(CompareOp::Suffix),
            "regexp" => Some(CompareOp::Regexp),
            _ => None,
        }
    }

    /// Whether the operator only applies to strings
    pub fn is_string_only(&self) -> bool {
        matches!(
            self,
            CompareOp::Contain | CompareOp::Prefix | CompareOp::Suffix | CompareOp::Regexp
        )
    }
}

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Inner join
    Inner,
}

impl JoinType {
    /// Parse the wire value
    pub fn parse(value: &str) -> Result<Self, QueryError> {
        match value {
            "INNER" => Ok(JoinType::Inner),
            other => Err(QueryError::UnsupportedJoinType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_item_json() {
        let json = r#"{
            "queryConcatType": "single",
            "filePos": [["QmA", "QmA2"]],
            "returnField": ["QmA_*"],
            "queryConditions": [[
                {"field": "age", "pos": "QmA", "compare": "ge", "val": "30", "type": "int"}
            ]]
        }"#;
        let item = QueryItem::from_json(json).unwrap();

        assert_eq!(item.concat_type().unwrap(), ConcatType::Single);
        assert_eq!(item.file_pos[0], vec!["QmA", "QmA2"]);
        assert_eq!(item.query_conditions[0][0].kind, "int");
        assert_eq!(item.query_conditions[0][0].column_key(), "QmA_age");
        assert!(item.joint_conditions.is_empty());
    }

    #[test]
    fn test_malformed_query() {
        assert!(matches!(
            QueryItem::from_json("{not json"),
            Err(QueryError::MalformedQuery(_))
        ));
    }

    #[test]
    fn test_parsers() {
        assert_eq!(ConcatType::parse("multi").unwrap(), ConcatType::Multi);
        assert!(matches!(
            ConcatType::parse("both"),
            Err(QueryError::UnknownConcatType(v)) if v == "both"
        ));
        assert_eq!(ValueKind::parse("float"), Some(ValueKind::Float));
        assert_eq!(ValueKind::parse("date"), None);
        assert_eq!(CompareOp::parse("regexp"), Some(CompareOp::Regexp));
        assert!(CompareOp::Suffix.is_string_only());
        assert!(!CompareOp::Ge.is_string_only());
        assert!(JoinType::parse("OUTER").is_err());
    }
}
