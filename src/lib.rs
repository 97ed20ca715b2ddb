/// MedChain Index - off-chain acceleration layer for a permissioned medical ledger
///
/// This is the root crate that provides workspace-level documentation.
/// Actual implementation is in the subcrates:
/// - `medchain-index-core`: Data models, bitmap math and the tabular query/join engine
/// - `medchain-index-indexer`: Block listener, multi-layer index builder and search planner

/// This module is intentionally empty as the actual implementation
/// is in the subcrates.
/// Returns the version of the package.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
