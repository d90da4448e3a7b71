//! Chunk blob rows.
//!
//! The store never interprets terrain: chunks are opaque blobs produced by
//! the [`codec`](crate::codec) module, written exactly once per key.

use redb::ReadableTable;

use crate::error::Error;

use super::{Store, StoreError, CHUNKS};


impl Store {

    /// Fetch a chunk blob, when present.
    pub fn get_chunk_blob(&self, world_id: u64, cx: i32, cy: i32) -> Result<Option<Vec<u8>>, Error> {
        let txn = self.begin_read()?;
        let chunks = txn.open_table(CHUNKS).map_err(StoreError::from)?;
        let blob = chunks
            .get(&(world_id, cx, cy))
            .map_err(StoreError::from)?
            .map(|guard| guard.value());
        Ok(blob)
    }

    /// Insert a chunk blob unless the key is already materialized, returning
    /// the committed blob and whether this call created the row.
    ///
    /// This is the insert-ignore-then-read half of the at-most-once
    /// materialization policy: concurrent writers for the same key serialize
    /// on the write transaction and every loser adopts the winner's row.
    pub fn insert_chunk_blob(
        &self,
        world_id: u64,
        cx: i32,
        cy: i32,
        blob: Vec<u8>,
    ) -> Result<(Vec<u8>, bool), Error> {

        let txn = self.begin_write()?;
        let existing;
        {
            let mut chunks = txn.open_table(CHUNKS).map_err(StoreError::from)?;
            existing = chunks
                .get(&(world_id, cx, cy))
                .map_err(StoreError::from)?
                .map(|guard| guard.value());
            if existing.is_none() {
                chunks.insert((world_id, cx, cy), &blob).map_err(StoreError::from)?;
            }
        }

        match existing {
            Some(winner) => {
                // Lost the race; drop our blob without committing anything.
                drop(txn);
                Ok((winner, false))
            }
            None => {
                txn.commit().map_err(StoreError::from)?;
                Ok((blob, true))
            }
        }

    }

    /// Number of chunk rows of a world.
    pub fn count_chunks(&self, world_id: u64) -> Result<u64, Error> {
        let txn = self.begin_read()?;
        let chunks = txn.open_table(CHUNKS).map_err(StoreError::from)?;
        let range = chunks
            .range((world_id, i32::MIN, i32::MIN)..=(world_id, i32::MAX, i32::MAX))
            .map_err(StoreError::from)?;
        let mut count = 0;
        for row in range {
            row.map_err(StoreError::from)?;
            count += 1;
        }
        Ok(count)
    }

}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn insert_is_first_writer_wins() {
        let store = Store::in_memory().unwrap();
        assert_eq!(store.get_chunk_blob(1, 0, 0).unwrap(), None);

        let (blob, created) = store.insert_chunk_blob(1, 0, 0, vec![1, 2, 3]).unwrap();
        assert!(created);
        assert_eq!(blob, vec![1, 2, 3]);

        // A second writer for the same key adopts the committed row.
        let (blob, created) = store.insert_chunk_blob(1, 0, 0, vec![9, 9, 9]).unwrap();
        assert!(!created);
        assert_eq!(blob, vec![1, 2, 3]);

        assert_eq!(store.get_chunk_blob(1, 0, 0).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.count_chunks(1).unwrap(), 1);
        assert_eq!(store.count_chunks(2).unwrap(), 0);
    }

    #[test]
    fn keys_are_per_world_and_coordinate() {
        let store = Store::in_memory().unwrap();
        store.insert_chunk_blob(1, 0, 0, vec![1]).unwrap();
        store.insert_chunk_blob(1, -1, 4, vec![2]).unwrap();
        store.insert_chunk_blob(2, 0, 0, vec![3]).unwrap();
        assert_eq!(store.get_chunk_blob(1, -1, 4).unwrap(), Some(vec![2]));
        assert_eq!(store.get_chunk_blob(2, 0, 0).unwrap(), Some(vec![3]));
        assert_eq!(store.count_chunks(1).unwrap(), 2);
    }

}
