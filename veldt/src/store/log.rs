//! The append-only harvest log.

use redb::{ReadableTable, ReadableTableMetadata, WriteTransaction};
use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::{decode_row, encode_row, next_seq, Store, StoreError, HARVEST_LOG, SEQ_HARVEST};


/// Record of one committed harvest. Entries are never mutated; ids are
/// allocated by the committing transaction, so entries for one node are
/// totally ordered by commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestLogEntry {
    pub id: u64,
    pub character_id: u64,
    pub node_id: u64,
    pub amount: u32,
    pub occurred_at: u64,
}


/// Append a log entry inside an open write transaction.
pub(crate) fn txn_append_harvest(
    txn: &WriteTransaction,
    character_id: u64,
    node_id: u64,
    amount: u32,
    now: u64,
) -> Result<HarvestLogEntry, StoreError> {
    let entry = HarvestLogEntry {
        id: next_seq(txn, SEQ_HARVEST)?,
        character_id,
        node_id,
        amount,
        occurred_at: now,
    };
    let mut log = txn.open_table(HARVEST_LOG)?;
    log.insert(entry.id, encode_row(&entry)?)?;
    Ok(entry)
}


impl Store {

    /// Log entries touching a node, oldest first.
    pub fn harvest_log_for_node(&self, node_id: u64) -> Result<Vec<HarvestLogEntry>, Error> {
        let txn = self.begin_read()?;
        let log = txn.open_table(HARVEST_LOG).map_err(StoreError::from)?;
        let mut list = Vec::new();
        for row in log.iter().map_err(StoreError::from)? {
            let (_, value) = row.map_err(StoreError::from)?;
            let entry: HarvestLogEntry = decode_row(&value.value())?;
            if entry.node_id == node_id {
                list.push(entry);
            }
        }
        Ok(list)
    }

    /// Total number of log entries.
    pub fn harvest_log_len(&self) -> Result<u64, Error> {
        let txn = self.begin_read()?;
        let log = txn.open_table(HARVEST_LOG).map_err(StoreError::from)?;
        Ok(log.len().map_err(StoreError::from)?)
    }

}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn entries_are_ordered_by_commit() {
        let store = Store::in_memory().unwrap();

        for (amount, now) in [(3u32, 100u64), (4, 150), (5, 200)] {
            let txn = store.begin_write().unwrap();
            txn_append_harvest(&txn, 7, 42, amount, now).unwrap();
            txn.commit().unwrap();
        }
        let txn = store.begin_write().unwrap();
        txn_append_harvest(&txn, 7, 99, 1, 250).unwrap();
        txn.commit().unwrap();

        let entries = store.harvest_log_for_node(42).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.windows(2).all(|pair| pair[0].id < pair[1].id));
        assert_eq!(entries[0].amount, 3);
        assert_eq!(entries[2].occurred_at, 200);
        assert_eq!(store.harvest_log_len().unwrap(), 4);
    }

}
