//! Character inventory rows.
//!
//! Inventories are owned by characters, which live with an external
//! collaborator; the engine only ever credits them inside harvest
//! transactions and garbage-collects rows that decayed to zero.

use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::{decode_row, encode_row, Store, StoreError, INVENTORIES};


/// One stack of items owned by a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub character_id: u64,
    pub item_id: u32,
    pub quantity: u64,
    pub created_at: u64,
    pub updated_at: u64,
}


/// Credit an inventory row inside an open write transaction, creating it on
/// first touch.
pub(crate) fn txn_credit_inventory(
    txn: &WriteTransaction,
    character_id: u64,
    item_id: u32,
    amount: u64,
    now: u64,
) -> Result<InventoryEntry, StoreError> {

    let mut inventories = txn.open_table(INVENTORIES)?;
    let existing = inventories
        .get(&(character_id, item_id))?
        .map(|guard| guard.value());

    let entry = match existing {
        Some(bytes) => {
            let mut entry: InventoryEntry = decode_row(&bytes)?;
            entry.quantity += amount;
            entry.updated_at = now;
            entry
        }
        None => InventoryEntry {
            character_id,
            item_id,
            quantity: amount,
            created_at: now,
            updated_at: now,
        },
    };

    inventories.insert((character_id, item_id), encode_row(&entry)?)?;
    Ok(entry)

}


impl Store {

    /// Fetch one inventory row, when present.
    pub fn get_inventory_entry(
        &self,
        character_id: u64,
        item_id: u32,
    ) -> Result<Option<InventoryEntry>, Error> {
        let txn = self.begin_read()?;
        let inventories = txn.open_table(INVENTORIES).map_err(StoreError::from)?;
        match inventories.get(&(character_id, item_id)).map_err(StoreError::from)? {
            Some(guard) => Ok(Some(decode_row(&guard.value())?)),
            None => Ok(None),
        }
    }

    /// All inventory rows of a character, ordered by item id.
    pub fn list_inventory(&self, character_id: u64) -> Result<Vec<InventoryEntry>, Error> {
        let txn = self.begin_read()?;
        let inventories = txn.open_table(INVENTORIES).map_err(StoreError::from)?;
        let mut list = Vec::new();
        let range = inventories
            .range((character_id, u32::MIN)..=(character_id, u32::MAX))
            .map_err(StoreError::from)?;
        for row in range {
            let (_, value) = row.map_err(StoreError::from)?;
            list.push(decode_row::<InventoryEntry>(&value.value())?);
        }
        Ok(list)
    }

    /// Delete rows whose quantity decayed to zero, returning how many were
    /// collected.
    pub fn collect_empty_inventory_rows(&self) -> Result<usize, Error> {
        let txn = self.begin_write()?;
        let collected;
        {
            let mut inventories = txn.open_table(INVENTORIES).map_err(StoreError::from)?;

            let mut doomed = Vec::new();
            for row in inventories.iter().map_err(StoreError::from)? {
                let (key, value) = row.map_err(StoreError::from)?;
                let entry: InventoryEntry = decode_row(&value.value())?;
                if entry.quantity == 0 {
                    doomed.push(key.value());
                }
            }

            for key in &doomed {
                inventories.remove(key).map_err(StoreError::from)?;
            }
            collected = doomed.len();
        }
        txn.commit().map_err(StoreError::from)?;
        Ok(collected)
    }

}
