// Typed URL sync stores
// Managers own the two databases: local history and synced typed URL nodes.

pub mod history_manager;
pub mod sync_node_store;
