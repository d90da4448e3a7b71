//! Persistent store over an embedded ACID database.
//!
//! All world state lives in one [`redb`] database. Its single-writer model
//! is the mechanism behind two core guarantees: at-most-once chunk
//! materialization (insert-ignore-then-read under the write transaction)
//! and serializable harvest transactions. Row values are CBOR-encoded serde
//! structs; chunk terrain is stored as its opaque blob, never as columns.

use std::path::Path;

use redb::{Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

mod world;
mod chunk;
mod node;
mod inventory;
mod log;

pub use world::World;
pub use inventory::InventoryEntry;
pub use log::HarvestLogEntry;

pub(crate) use node::{txn_read_node, txn_write_node};
pub(crate) use inventory::txn_credit_inventory;
pub(crate) use log::txn_append_harvest;


/// World rows, keyed by world id.
pub(crate) const WORLDS: TableDefinition<u64, Vec<u8>> = TableDefinition::new("worlds");
/// Unique world name index.
pub(crate) const WORLD_NAMES: TableDefinition<&str, u64> = TableDefinition::new("world_names");
/// Chunk blobs, keyed by (world id, cx, cy).
pub(crate) const CHUNKS: TableDefinition<(u64, i32, i32), Vec<u8>> = TableDefinition::new("chunks");
/// Resource node rows, keyed by node id.
pub(crate) const NODES: TableDefinition<u64, Vec<u8>> = TableDefinition::new("nodes");
/// Unique node position index, (cx, cy, local_x, local_y) to node id.
pub(crate) const NODE_POSITIONS: TableDefinition<(i32, i32, u8, u8), u64> =
    TableDefinition::new("node_positions");
/// Node index by resource type, keyed (item id, node id).
pub(crate) const NODE_KINDS: TableDefinition<(u32, u64), ()> = TableDefinition::new("node_kinds");
/// Node index by cluster, keyed (cluster id, node id).
pub(crate) const NODE_CLUSTERS: TableDefinition<(u64, u64), ()> =
    TableDefinition::new("node_clusters");
/// One-time node generation markers, keyed like chunks; the value is the
/// number of nodes created for the chunk.
pub(crate) const NODE_MARKERS: TableDefinition<(u64, i32, i32), u64> =
    TableDefinition::new("node_markers");
/// Inventory rows, keyed by (character id, item id).
pub(crate) const INVENTORIES: TableDefinition<(u64, u32), Vec<u8>> =
    TableDefinition::new("inventories");
/// Append-only harvest log, keyed by log entry id.
pub(crate) const HARVEST_LOG: TableDefinition<u64, Vec<u8>> = TableDefinition::new("harvest_log");
/// Named id sequences.
pub(crate) const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

pub(crate) const SEQ_WORLD: &str = "world_id";
pub(crate) const SEQ_NODE: &str = "node_id";
pub(crate) const SEQ_CLUSTER: &str = "cluster_id";
pub(crate) const SEQ_HARVEST: &str = "harvest_id";


/// Handle to the embedded database backing all world state. Cheap to share
/// behind an [`std::sync::Arc`]; transactions serialize internally.
pub struct Store {
    db: Database,
}

impl Store {

    /// Open the store at the given path, creating the file and its tables
    /// when missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self { db: Database::create(path)? };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Open a transient in-memory store, used by tests and tooling.
    pub fn in_memory() -> Result<Self, StoreError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())?;
        let store = Self { db };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Create every table up front so later read transactions never observe
    /// a missing table.
    fn ensure_tables(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            txn.open_table(WORLDS)?;
            txn.open_table(WORLD_NAMES)?;
            txn.open_table(CHUNKS)?;
            txn.open_table(NODES)?;
            txn.open_table(NODE_POSITIONS)?;
            txn.open_table(NODE_KINDS)?;
            txn.open_table(NODE_CLUSTERS)?;
            txn.open_table(NODE_MARKERS)?;
            txn.open_table(INVENTORIES)?;
            txn.open_table(HARVEST_LOG)?;
            txn.open_table(SEQUENCES)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub(crate) fn begin_read(&self) -> Result<ReadTransaction, StoreError> {
        Ok(self.db.begin_read()?)
    }

    pub(crate) fn begin_write(&self) -> Result<WriteTransaction, StoreError> {
        Ok(self.db.begin_write()?)
    }

}


/// Allocate `count` consecutive values of a named sequence inside the given
/// transaction, returning the first one. The allocation commits or aborts
/// with the surrounding transaction.
pub(crate) fn next_seq_block(
    txn: &WriteTransaction,
    name: &str,
    count: u64,
) -> Result<u64, StoreError> {
    let mut table = txn.open_table(SEQUENCES)?;
    let last = table.get(name)?.map(|guard| guard.value()).unwrap_or(0);
    table.insert(name, last + count)?;
    Ok(last + 1)
}

/// Allocate the next value of a named sequence.
pub(crate) fn next_seq(txn: &WriteTransaction, name: &str) -> Result<u64, StoreError> {
    next_seq_block(txn, name, 1)
}

pub(crate) fn encode_row<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(serde_cbor::to_vec(value)?)
}

pub(crate) fn decode_row<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_cbor::from_slice(bytes)?)
}


/// Errors from the storage layer, surfaced to callers as
/// [`Error::Internal`](crate::error::Error::Internal).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] redb::DatabaseError),
    #[error("transaction: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("table: {0}")]
    Table(#[from] redb::TableError),
    #[error("storage: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("commit: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("row codec: {0}")]
    Codec(#[from] serde_cbor::Error),
    #[error("chunk blob: {0}")]
    Blob(#[from] crate::codec::BlobError),
    #[error("inconsistent index: {0}")]
    Inconsistent(String),
}

impl StoreError {

    /// True for contention-shaped failures worth a bounded retry.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transaction(_) | StoreError::Commit(_))
    }

}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn sequences_are_monotonic() {
        let store = Store::in_memory().unwrap();
        let txn = store.begin_write().unwrap();
        assert_eq!(next_seq(&txn, SEQ_NODE).unwrap(), 1);
        assert_eq!(next_seq(&txn, SEQ_NODE).unwrap(), 2);
        assert_eq!(next_seq_block(&txn, SEQ_NODE, 10).unwrap(), 3);
        assert_eq!(next_seq(&txn, SEQ_NODE).unwrap(), 13);
        // Independent sequences do not interfere.
        assert_eq!(next_seq(&txn, SEQ_HARVEST).unwrap(), 1);
        txn.commit().unwrap();
    }

    #[test]
    fn aborted_allocations_roll_back() {
        let store = Store::in_memory().unwrap();
        {
            let txn = store.begin_write().unwrap();
            assert_eq!(next_seq(&txn, SEQ_NODE).unwrap(), 1);
            // Dropped without commit.
        }
        let txn = store.begin_write().unwrap();
        assert_eq!(next_seq(&txn, SEQ_NODE).unwrap(), 1);
        txn.commit().unwrap();
    }

}
