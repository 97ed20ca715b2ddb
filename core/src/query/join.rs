//! Join planning and execution
//!
//! The join conditions of a multi-dataset query form an undirected graph
//! whose nodes are dataset positions. The planner orders its edges so that
//! the executor can fold them left to right, each step attaching exactly one
//! new dataset to the accumulated table.

use std::collections::{HashMap, HashSet, VecDeque};

use log::debug;

use super::condition::compare_raw;
use super::table::Table;
use crate::error::QueryError;
use crate::models::{JoinType, JointCondition};

/// Undirected multigraph over dataset positions
struct JoinGraph {
    /// Node index to incident edge indices
    adjacency: Vec<Vec<usize>>,

    /// Remaining unused incident edges per node
    degree: Vec<usize>,

    /// Edge index to its endpoint node indices
    endpoints: Vec<(usize, usize)>,
}

impl JoinGraph {
    fn build(conditions: &[JointCondition]) -> Self {
        let mut nodes: HashMap<&str, usize> = HashMap::new();
        let mut adjacency: Vec<Vec<usize>> = Vec::new();
        let mut endpoints = Vec::with_capacity(conditions.len());

        for (edge, condition) in conditions.iter().enumerate() {
            let mut ends = [0usize; 2];
            for (slot, pos) in [condition.pos1.as_str(), condition.pos2.as_str()].into_iter().enumerate() {
                ends[slot] = *nodes.entry(pos).or_insert_with(|| {
                    adjacency.push(Vec::new());
                    adjacency.len() - 1
                });
            }
            let [a, b] = ends;
            adjacency[a].push(edge);
            adjacency[b].push(edge);
            endpoints.push((a, b));
        }

        let degree = adjacency.iter().map(Vec::len).collect();
        JoinGraph {
            adjacency,
            degree,
            endpoints,
        }
    }

    fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Peel leaves until none remain, returning edges in removal order.
    ///
    /// Leaves are seeded latest-first so that, once reversed, an already
    /// foldable input keeps its order.
    fn peel_leaves(&mut self) -> Vec<usize> {
        let mut used = vec![false; self.endpoints.len()];
        let mut order = Vec::with_capacity(self.endpoints.len());
        let mut leaves: VecDeque<usize> = (0..self.node_count())
            .rev()
            .filter(|node| self.degree[*node] == 1)
            .collect();

        while let Some(node) = leaves.pop_front() {
            let edge = match self.adjacency[node].iter().copied().find(|edge| !used[*edge]) {
                Some(edge) => edge,
                None => continue,
            };
            used[edge] = true;
            order.push(edge);

            let (a, b) = self.endpoints[edge];
            let neighbor = if a == node { b } else { a };
            self.degree[node] -= 1;
            self.degree[neighbor] -= 1;
            if self.degree[neighbor] == 1 {
                leaves.push_back(neighbor);
            }
        }

        order
    }
}

/// Order join conditions for left-to-right execution.
///
/// Every edge after the first shares exactly one endpoint with the datasets
/// joined so far. Cycles and disconnected graphs are rejected.
pub fn order(conditions: &[JointCondition]) -> Result<Vec<JointCondition>, QueryError> {
    if conditions.is_empty() {
        return Ok(Vec::new());
    }

    let mut graph = JoinGraph::build(conditions);
    if graph.node_count() != conditions.len() + 1 {
        return Err(QueryError::JoinGraphNotTree);
    }

    let removal = graph.peel_leaves();
    if removal.len() != conditions.len() {
        return Err(QueryError::JoinGraphNotTree);
    }

    Ok(removal
        .into_iter()
        .rev()
        .map(|edge| conditions[edge].clone())
        .collect())
}

/// Inner join of two tables on one typed column comparison.
///
/// `left` must hold the `pos1_field1` column and `right` the `pos2_field2`
/// column. The right header is shifted by the left table width.
pub fn inner_join(condition: &JointCondition, left: &Table, right: &Table) -> Result<Table, QueryError> {
    JoinType::parse(&condition.joint_type)?;

    let left_index = left
        .column_index(&format!("{}_{}", condition.pos1, condition.field1))
        .ok_or_else(|| QueryError::UnknownColumn {
            pos: condition.pos1.clone(),
            field: condition.field1.clone(),
        })?;
    let right_index = right
        .column_index(&format!("{}_{}", condition.pos2, condition.field2))
        .ok_or_else(|| QueryError::UnknownColumn {
            pos: condition.pos2.clone(),
            field: condition.field2.clone(),
        })?;

    let offset = left.width();
    let mut header = left.header.clone();
    header.extend(right.header.iter().map(|(key, index)| (key.clone(), index + offset)));

    let mut columns = left.columns.clone();
    columns.extend(right.columns.iter().cloned());

    let mut rows = Vec::new();
    for left_row in &left.rows {
        for right_row in &right.rows {
            let (Some(l), Some(r)) = (left_row.get(left_index), right_row.get(right_index)) else {
                continue;
            };
            if compare_raw(&condition.field1, &condition.kind, l, r, &condition.compare)? {
                let mut joined = left_row.clone();
                joined.extend(right_row.iter().cloned());
                rows.push(joined);
            }
        }
    }

    Ok(Table {
        header,
        columns,
        rows,
    })
}

/// Fold ordered join conditions over the dataset tables
pub fn join_all(ordered: &[JointCondition], tables: &HashMap<String, Table>) -> Result<Table, QueryError> {
    let base = |pos: &str| {
        tables
            .get(pos)
            .ok_or_else(|| QueryError::UnknownJoinDataset(pos.to_string()))
    };

    let (first, rest) = match ordered.split_first() {
        Some(split) => split,
        None => {
            // A lone dataset needs no join
            return match tables.values().next() {
                Some(table) if tables.len() == 1 => Ok(table.clone()),
                _ => Err(QueryError::JoinCountMismatch {
                    datasets: tables.len(),
                    joins: 0,
                }),
            };
        }
    };

    let mut joined: HashSet<&str> = HashSet::new();
    let mut result = inner_join(first, base(&first.pos1)?, base(&first.pos2)?)?;
    joined.insert(first.pos1.as_str());
    joined.insert(first.pos2.as_str());

    for condition in rest {
        let has_left = joined.contains(condition.pos1.as_str());
        let has_right = joined.contains(condition.pos2.as_str());

        result = match (has_left, has_right) {
            (true, false) => {
                let right = base(&condition.pos2)?;
                joined.insert(condition.pos2.as_str());
                inner_join(condition, &result, right)?
            }
            (false, true) => {
                // Keep the accumulated table on the left, swap the condition sides
                let swapped = JointCondition {
                    pos1: condition.pos2.clone(),
                    field1: condition.field2.clone(),
                    pos2: condition.pos1.clone(),
                    field2: condition.field1.clone(),
                    ..condition.clone()
                };
                let right = base(&condition.pos1)?;
                joined.insert(condition.pos1.as_str());
                inner_join(&swapped, &result, right)?
            }
            (true, true) => return Err(QueryError::JoinGraphNotTree),
            (false, false) => return Err(QueryError::UnjoinedDataset),
        };
        debug!("Joined {} datasets, {} rows", joined.len(), result.row_count());
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn edge(pos1: &str, pos2: &str) -> JointCondition {
        JointCondition::inner(pos1, "id", pos2, "id", "string")
    }

    fn table(pos: &str, columns: &[&str], rows: &[&[&str]]) -> Table {
        let columns: Vec<String> = columns.iter().map(|c| format!("{}_{}", pos, c)).collect();
        Table {
            header: columns.iter().enumerate().map(|(i, c)| (c.clone(), i)).collect(),
            columns,
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    /// Check that every edge after the first touches exactly one joined dataset
    fn assert_foldable(ordered: &[JointCondition]) {
        let mut joined: HashSet<String> = HashSet::new();
        for (i, e) in ordered.iter().enumerate() {
            if i == 0 {
                joined.insert(e.pos1.clone());
                joined.insert(e.pos2.clone());
                continue;
            }
            let l = joined.contains(&e.pos1);
            let r = joined.contains(&e.pos2);
            assert!(l ^ r, "edge {}-{} is not attachable", e.pos1, e.pos2);
            joined.insert(e.pos1.clone());
            joined.insert(e.pos2.clone());
        }
    }

    #[test]
    fn test_order_chain() {
        let ordered = order(&[edge("A", "B"), edge("B", "C")]).unwrap();
        assert_eq!(ordered.len(), 2);
        assert_foldable(&ordered);

        // (A,B) comes before the edge reaching C through B
        let ab = ordered.iter().position(|e| e.pos1 == "A").unwrap();
        let bc = ordered.iter().position(|e| e.pos2 == "C").unwrap();
        assert!(ab < bc);
    }

    #[test]
    fn test_order_star() {
        let ordered = order(&[edge("H", "A"), edge("H", "B"), edge("C", "H")]).unwrap();
        assert_foldable(&ordered);
    }

    #[test]
    fn test_order_rejects_cycle_and_forest() {
        assert_eq!(
            order(&[edge("A", "B"), edge("B", "C"), edge("C", "A")]).unwrap_err(),
            QueryError::JoinGraphNotTree
        );
        // Four datasets, two components
        assert_eq!(
            order(&[edge("A", "B"), edge("C", "D")]).unwrap_err(),
            QueryError::JoinGraphNotTree
        );
        // Parallel edges between the same pair
        assert_eq!(
            order(&[edge("A", "B"), edge("A", "B")]).unwrap_err(),
            QueryError::JoinGraphNotTree
        );
        assert!(order(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_inner_join() {
        let left = table("A", &["id", "name"], &[&["1", "Alice"], &["2", "Bob"]]);
        let right = table("B", &["id", "ward"], &[&["2", "W3"], &["1", "W1"], &["1", "W9"]]);

        let joined = inner_join(&edge("A", "B"), &left, &right).unwrap();
        assert_eq!(joined.width(), 4);
        assert_eq!(joined.column_index("B_ward"), Some(3));
        assert_eq!(joined.row_count(), 3);
        assert_eq!(joined.rows[0], vec!["1", "Alice", "1", "W1"]);
    }

    #[test]
    fn test_inner_join_numeric_and_errors() {
        let left = table("A", &["age"], &[&["07"], &["8"]]);
        let right = table("B", &["age"], &[&["7"]]);

        let cond = JointCondition::inner("A", "age", "B", "age", "int");
        assert_eq!(inner_join(&cond, &left, &right).unwrap().row_count(), 1);

        let cond = JointCondition::inner("A", "age", "B", "age", "string");
        assert_eq!(inner_join(&cond, &left, &right).unwrap().row_count(), 0);

        let mut outer = cond.clone();
        outer.joint_type = "LEFT".to_string();
        assert_eq!(
            inner_join(&outer, &left, &right).unwrap_err(),
            QueryError::UnsupportedJoinType("LEFT".to_string())
        );

        let cond = JointCondition::inner("A", "weight", "B", "age", "int");
        assert!(matches!(
            inner_join(&cond, &left, &right),
            Err(QueryError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_join_all_three_datasets() {
        let mut tables = HashMap::new();
        tables.insert("A".to_string(), table("A", &["id", "name"], &[&["1", "Alice"], &["2", "Bob"]]));
        tables.insert("B".to_string(), table("B", &["id", "cid"], &[&["1", "c7"], &["2", "c8"]]));
        tables.insert("C".to_string(), table("C", &["cid", "city"], &[&["c7", "Oslo"]]));

        let conditions = vec![
            edge("A", "B"),
            JointCondition::inner("C", "cid", "B", "cid", "string"),
        ];
        let joined = join_all(&order(&conditions).unwrap(), &tables).unwrap();

        assert_eq!(joined.width(), 6);
        assert_eq!(joined.row_count(), 1);
        let row = &joined.rows[0];
        assert_eq!(row[joined.column_index("A_name").unwrap()], "Alice");
        assert_eq!(row[joined.column_index("C_city").unwrap()], "Oslo");
    }

    #[test]
    fn test_join_all_errors() {
        let mut tables = HashMap::new();
        tables.insert("A".to_string(), table("A", &["id"], &[&["1"]]));
        tables.insert("B".to_string(), table("B", &["id"], &[&["1"]]));

        assert_eq!(
            join_all(&[edge("A", "Z")], &tables).unwrap_err(),
            QueryError::UnknownJoinDataset("Z".to_string())
        );
        assert_eq!(
            join_all(&[edge("A", "B"), edge("C", "D")], &tables).unwrap_err(),
            QueryError::UnjoinedDataset
        );
    }

    proptest! {
        #[test]
        fn prop_random_trees_are_foldable(parents in proptest::collection::vec(any::<prop::sample::Index>(), 1..12)) {
            // Node i+1 attaches to a random earlier node
            let conditions: Vec<JointCondition> = parents
                .iter()
                .enumerate()
                .map(|(i, p)| edge(&format!("D{}", p.index(i + 1)), &format!("D{}", i + 1)))
                .collect();

            let ordered = order(&conditions).unwrap();
            prop_assert_eq!(ordered.len(), conditions.len());
            assert_foldable(&ordered);
        }
    }
}
