//! Engine-wide constants. All of them are immutable at program start — the
//! spec explicitly calls for no mutable global state (§9).

/// Cap on the number of nodes a topology view returns before it starts
/// collapsing/truncating.
pub const MAX_TOPOLOGY_NODES: usize = 2000;

/// Parameter-limit-safe chunk size for IN-style lookups against the store.
pub const STORE_CHUNK_SIZE: usize = 500;

/// Chunk size the audit engine streams resources in.
pub const AUDIT_CHUNK_SIZE: usize = 5000;

/// Cap on the number of non-compliant resources a tag report will list.
pub const MAX_MISSING_TAG_RESOURCES: usize = 500;

/// Cap on individually-rendered instance nodes in the EXPOSURE view before
/// they collapse into an overflow summary node.
pub const MAX_EXPOSURE_INSTANCES: usize = 500;
