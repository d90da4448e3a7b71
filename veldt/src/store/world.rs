//! World rows and the registry operations.
//!
//! A deployment resolves "the default world" as the oldest row; creation on
//! first boot is an explicit [`Store::ensure_default_world`] call during
//! startup rather than hidden global state.

use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Error;

use super::{decode_row, encode_row, next_seq, Store, StoreError, WORLDS, WORLD_NAMES};


/// A world row: identity, unique name, immutable seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    pub id: u64,
    pub name: String,
    /// The generation seed. Immutable for the lifetime of the world.
    pub seed: i64,
    /// Creation time, unix seconds UTC.
    pub created_at: u64,
}

impl Store {

    /// Create a world. Fails with [`Error::AlreadyExists`] when the name is
    /// taken.
    pub fn create_world(&self, name: &str, seed: i64, now: u64) -> Result<World, Error> {

        if name.is_empty() {
            return Err(Error::InvalidArgument("empty world name".into()));
        }

        let txn = self.begin_write()?;
        let world;
        {
            let mut names = txn.open_table(WORLD_NAMES).map_err(StoreError::from)?;
            if names.get(name).map_err(StoreError::from)?.is_some() {
                return Err(Error::AlreadyExists(format!("world `{name}`")));
            }

            let id = next_seq(&txn, super::SEQ_WORLD)?;
            world = World { id, name: name.to_owned(), seed, created_at: now };

            names.insert(name, id).map_err(StoreError::from)?;
            let mut worlds = txn.open_table(WORLDS).map_err(StoreError::from)?;
            worlds.insert(id, encode_row(&world)?).map_err(StoreError::from)?;
        }
        txn.commit().map_err(StoreError::from)?;

        info!(id = world.id, seed, "created world `{name}`");
        Ok(world)

    }

    /// Fetch a world by id.
    pub fn get_world(&self, id: u64) -> Result<World, Error> {
        let txn = self.begin_read()?;
        let worlds = txn.open_table(WORLDS).map_err(StoreError::from)?;
        match worlds.get(&id).map_err(StoreError::from)? {
            Some(guard) => Ok(decode_row(&guard.value())?),
            None => Err(Error::NotFound("world")),
        }
    }

    /// Fetch a world by its unique name.
    pub fn get_world_by_name(&self, name: &str) -> Result<World, Error> {
        let txn = self.begin_read()?;
        let names = txn.open_table(WORLD_NAMES).map_err(StoreError::from)?;
        let id = match names.get(name).map_err(StoreError::from)? {
            Some(guard) => guard.value(),
            None => return Err(Error::NotFound("world")),
        };
        drop(names);
        let worlds = txn.open_table(WORLDS).map_err(StoreError::from)?;
        match worlds.get(&id).map_err(StoreError::from)? {
            Some(guard) => Ok(decode_row(&guard.value())?),
            None => Err(StoreError::Inconsistent(format!("world name `{name}` maps to missing row {id}")).into()),
        }
    }

    /// All worlds, oldest first.
    pub fn list_worlds(&self) -> Result<Vec<World>, Error> {
        let txn = self.begin_read()?;
        let worlds = txn.open_table(WORLDS).map_err(StoreError::from)?;
        let mut list = Vec::new();
        for row in worlds.iter().map_err(StoreError::from)? {
            let (_, value) = row.map_err(StoreError::from)?;
            list.push(decode_row::<World>(&value.value())?);
        }
        list.sort_by_key(|world| (world.created_at, world.id));
        Ok(list)
    }

    /// The deployment's default world: the oldest one.
    pub fn default_world(&self) -> Result<World, Error> {
        self.list_worlds()?.into_iter().next().ok_or(Error::NotFound("world"))
    }

    /// Resolve the default world, creating it with the configured name and
    /// seed on first boot.
    pub fn ensure_default_world(&self, name: &str, seed: i64, now: u64) -> Result<World, Error> {
        match self.default_world() {
            Ok(world) => Ok(world),
            Err(Error::NotFound(_)) => self.create_world(name, seed, now),
            Err(err) => Err(err),
        }
    }

    /// Rename a world. The seed and identity are immutable; only the name
    /// changes, and the new name must be free.
    pub fn rename_world(&self, id: u64, new_name: &str) -> Result<World, Error> {

        if new_name.is_empty() {
            return Err(Error::InvalidArgument("empty world name".into()));
        }

        let txn = self.begin_write()?;
        let world;
        {
            let mut worlds = txn.open_table(WORLDS).map_err(StoreError::from)?;
            let mut row: World = match worlds.get(&id).map_err(StoreError::from)? {
                Some(guard) => decode_row(&guard.value())?,
                None => return Err(Error::NotFound("world")),
            };

            let mut names = txn.open_table(WORLD_NAMES).map_err(StoreError::from)?;
            if row.name != new_name {
                if names.get(new_name).map_err(StoreError::from)?.is_some() {
                    return Err(Error::AlreadyExists(format!("world `{new_name}`")));
                }
                names.remove(row.name.as_str()).map_err(StoreError::from)?;
                names.insert(new_name, id).map_err(StoreError::from)?;
            }

            row.name = new_name.to_owned();
            worlds.insert(id, encode_row(&row)?).map_err(StoreError::from)?;
            world = row;
        }
        txn.commit().map_err(StoreError::from)?;

        Ok(world)

    }

}
