//! Row predicate evaluation
//!
//! Conditions inside one group are AND'd, groups are OR'd. Comparisons are
//! typed: `int` and `float` parse both sides, `string` compares
//! lexicographically and supports the substring/pattern operators.

use regex::Regex;

use super::table::HeaderMap;
use crate::error::QueryError;
use crate::models::{CompareOp, Condition, ValueKind};

/// Fields whose empty value means "no constraint requested"
const OPTIONAL_STRING_FIELDS: [&str; 5] = ["name", "gender", "hospital", "department", "diseaseCode"];

fn ordering_holds(op: CompareOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CompareOp::Gt => ordering == Greater,
        CompareOp::Lt => ordering == Less,
        CompareOp::Ge => ordering != Less,
        CompareOp::Le => ordering != Greater,
        CompareOp::Eq => ordering == Equal,
        CompareOp::Ne => ordering != Equal,
        _ => false,
    }
}

/// Compare a cell with a bound as 64-bit integers
pub fn compare_int(cell: &str, bound: &str, op: CompareOp) -> Result<bool, QueryError> {
    if op.is_string_only() {
        return Err(unsupported(op, ValueKind::Int));
    }
    let left: i64 = cell.parse().map_err(|_| QueryError::NonNumericCell {
        value: cell.to_string(),
        kind: ValueKind::Int.as_str().to_string(),
    })?;
    let right: i64 = bound.parse().map_err(|_| QueryError::NonNumericBound {
        value: bound.to_string(),
        kind: ValueKind::Int.as_str().to_string(),
    })?;
    Ok(ordering_holds(op, left.cmp(&right)))
}

/// Compare a cell with a bound as 64-bit floats
pub fn compare_float(cell: &str, bound: &str, op: CompareOp) -> Result<bool, QueryError> {
    if op.is_string_only() {
        return Err(unsupported(op, ValueKind::Float));
    }
    let left: f64 = cell.parse().map_err(|_| QueryError::NonNumericCell {
        value: cell.to_string(),
        kind: ValueKind::Float.as_str().to_string(),
    })?;
    let right: f64 = bound.parse().map_err(|_| QueryError::NonNumericBound {
        value: bound.to_string(),
        kind: ValueKind::Float.as_str().to_string(),
    })?;
    // NaN never satisfies an ordering, only `ne`
    Ok(match left.partial_cmp(&right) {
        Some(ordering) => ordering_holds(op, ordering),
        None => op == CompareOp::Ne,
    })
}

/// Compare a cell with a bound as strings
pub fn compare_string(cell: &str, bound: &str, op: CompareOp) -> Result<bool, QueryError> {
    Ok(match op {
        CompareOp::Contain => cell.contains(bound),
        CompareOp::Prefix => cell.starts_with(bound),
        CompareOp::Suffix => cell.ends_with(bound),
        CompareOp::Regexp => {
            let pattern = Regex::new(bound).map_err(|e| QueryError::BadRegex(e.to_string()))?;
            pattern.is_match(cell)
        }
        _ => ordering_holds(op, cell.cmp(bound)),
    })
}

/// Compare two values with a typed operator
pub fn compare(kind: ValueKind, cell: &str, bound: &str, op: CompareOp) -> Result<bool, QueryError> {
    match kind {
        ValueKind::Int => compare_int(cell, bound, op),
        ValueKind::Float => compare_float(cell, bound, op),
        ValueKind::String => compare_string(cell, bound, op),
    }
}

/// Parse the wire type and operator, then compare
pub fn compare_raw(field: &str, kind: &str, cell: &str, bound: &str, op: &str) -> Result<bool, QueryError> {
    let value_kind = ValueKind::parse(kind).ok_or_else(|| QueryError::UnsupportedType {
        field: field.to_string(),
        kind: kind.to_string(),
    })?;
    let compare_op = CompareOp::parse(op).ok_or_else(|| QueryError::UnsupportedOperator {
        op: op.to_string(),
        kind: value_kind.as_str().to_string(),
    })?;
    compare(value_kind, cell, bound, compare_op)
}

fn unsupported(op: CompareOp, kind: ValueKind) -> QueryError {
    QueryError::UnsupportedOperator {
        op: format!("{:?}", op).to_lowercase(),
        kind: kind.as_str().to_string(),
    }
}

fn is_bypass(condition: &Condition) -> bool {
    (condition.field == "age" && condition.val == "0")
        || (condition.val.is_empty() && OPTIONAL_STRING_FIELDS.contains(&condition.field.as_str()))
}

/// Check a row against one AND group of conditions
pub fn matches(row: &[String], header: &HeaderMap, conditions: &[Condition]) -> Result<bool, QueryError> {
    if row.is_empty() {
        return Ok(false);
    }

    for condition in conditions {
        let index = header
            .get(&condition.column_key())
            .copied()
            .ok_or_else(|| QueryError::UnknownColumn {
                pos: condition.pos.clone(),
                field: condition.field.clone(),
            })?;

        if is_bypass(condition) {
            continue;
        }

        let cell = row.get(index).map(String::as_str).unwrap_or("");
        if !compare_raw(&condition.field, &condition.kind, cell, &condition.val, &condition.compare)? {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Check a row against OR'd condition groups; no groups match every row
pub fn matches_any(row: &[String], header: &HeaderMap, groups: &[Vec<Condition>]) -> Result<bool, QueryError> {
    if groups.is_empty() {
        return Ok(!row.is_empty());
    }
    for group in groups {
        if matches(row, header, group)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn header() -> HeaderMap {
        [("A_id", 0), ("A_name", 1), ("A_age", 2), ("A_gender", 3)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[rstest]
    #[case("34", "30", "gt", true)]
    #[case("34", "34", "gt", false)]
    #[case("34", "34", "ge", true)]
    #[case("29", "30", "lt", true)]
    #[case("30", "30", "le", true)]
    #[case("30", "30", "eq", true)]
    #[case("30", "31", "ne", true)]
    #[case("-5", "0", "lt", true)]
    fn test_compare_int(#[case] cell: &str, #[case] bound: &str, #[case] op: &str, #[case] expected: bool) {
        let op = CompareOp::parse(op).unwrap();
        assert_eq!(compare_int(cell, bound, op).unwrap(), expected);
    }

    #[rstest]
    #[case("1.5", "1.25", "gt", true)]
    #[case("1.5", "1.50", "eq", true)]
    #[case("2", "2.5", "le", true)]
    #[case("2", "2.5", "ne", true)]
    fn test_compare_float(#[case] cell: &str, #[case] bound: &str, #[case] op: &str, #[case] expected: bool) {
        let op = CompareOp::parse(op).unwrap();
        assert_eq!(compare_float(cell, bound, op).unwrap(), expected);
    }

    #[rstest]
    #[case("Alice", "Alice", "eq", true)]
    #[case("Alice", "Bob", "lt", true)]
    #[case("Bob", "Alice", "ge", true)]
    #[case("Alice", "lic", "contain", true)]
    #[case("Alice", "Al", "prefix", true)]
    #[case("Alice", "ce", "suffix", true)]
    #[case("Alice", "ab", "suffix", false)]
    #[case("C01-2", "^C0[0-9]", "regexp", true)]
    #[case("X01", "^C0[0-9]", "regexp", false)]
    // Lexicographic, not numeric
    #[case("10", "9", "gt", false)]
    fn test_compare_string(#[case] cell: &str, #[case] bound: &str, #[case] op: &str, #[case] expected: bool) {
        let op = CompareOp::parse(op).unwrap();
        assert_eq!(compare_string(cell, bound, op).unwrap(), expected);
    }

    #[test]
    fn test_compare_errors() {
        assert!(matches!(
            compare_int("abc", "3", CompareOp::Eq),
            Err(QueryError::NonNumericCell { value, .. }) if value == "abc"
        ));
        assert!(matches!(
            compare_float("1.0", "x", CompareOp::Eq),
            Err(QueryError::NonNumericBound { value, .. }) if value == "x"
        ));
        assert!(matches!(
            compare_int("1", "1", CompareOp::Contain),
            Err(QueryError::UnsupportedOperator { op, kind }) if op == "contain" && kind == "int"
        ));
        assert!(matches!(
            compare_string("a", "(", CompareOp::Regexp),
            Err(QueryError::BadRegex(_))
        ));
        assert!(matches!(
            compare_raw("age", "date", "1", "1", "eq"),
            Err(QueryError::UnsupportedType { kind, .. }) if kind == "date"
        ));
        assert!(matches!(
            compare_raw("age", "int", "1", "1", "between"),
            Err(QueryError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn test_matches_and_semantics() {
        let header = header();
        let alice = row(&["1", "Alice", "34", "F"]);
        let conditions = vec![
            Condition::new("age", "A", "ge", "30", "int"),
            Condition::new("gender", "A", "eq", "F", "string"),
        ];
        assert!(matches(&alice, &header, &conditions).unwrap());

        let bob = row(&["2", "Bob", "34", "M"]);
        assert!(!matches(&bob, &header, &conditions).unwrap());
    }

    #[test]
    fn test_matches_unknown_column() {
        let conditions = vec![Condition::new("weight", "A", "gt", "1", "int")];
        let err = matches(&row(&["1", "Alice", "34", "F"]), &header(), &conditions).unwrap_err();
        assert_eq!(
            err,
            QueryError::UnknownColumn {
                pos: "A".to_string(),
                field: "weight".to_string()
            }
        );
    }

    #[test]
    fn test_sentinels_never_exclude() {
        let header = header();
        let alice = row(&["1", "Alice", "34", "F"]);

        // Would fail as comparisons; both are bypassed
        let conditions = vec![
            Condition::new("age", "A", "eq", "0", "int"),
            Condition::new("name", "A", "eq", "", "string"),
            Condition::new("gender", "A", "eq", "", "string"),
        ];
        assert!(matches(&alice, &header, &conditions).unwrap());

        // An empty value on a column outside the named set is still compared
        let conditions = vec![Condition::new("id", "A", "eq", "", "string")];
        assert!(!matches(&alice, &header, &conditions).unwrap());
    }

    #[test]
    fn test_matches_any_or_semantics() {
        let header = header();
        let alice = row(&["1", "Alice", "34", "F"]);
        let groups = vec![
            vec![Condition::new("name", "A", "eq", "Bob", "string")],
            vec![Condition::new("age", "A", "lt", "40", "int")],
        ];
        assert!(matches_any(&alice, &header, &groups).unwrap());

        let groups = vec![
            vec![Condition::new("name", "A", "eq", "Bob", "string")],
            vec![Condition::new("age", "A", "gt", "40", "int")],
        ];
        assert!(!matches_any(&alice, &header, &groups).unwrap());

        assert!(matches_any(&alice, &header, &[]).unwrap());
        assert!(!matches_any(&[], &header, &[]).unwrap());
    }
}
