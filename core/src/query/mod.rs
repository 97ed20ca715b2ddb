//! Tabular query and join engine
//!
//! Evaluates caller-supplied filter expressions over decrypted flat-file
//! tables, joining several datasets when the query asks for it.

pub mod condition;
pub mod engine;
pub mod join;
pub mod table;

pub use condition::{compare, matches, matches_any};
pub use engine::{run, run_query_json, try_run, QueryResult, ResultRow, JOIN_SUCCESS_MESSAGE, SINGLE_SUCCESS_MESSAGE};
pub use join::{inner_join, join_all, order};
pub use table::{aggregate, HeaderMap, Table};
