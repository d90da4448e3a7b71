//! Transactional harvesting.
//!
//! A harvest is one serializable write transaction: validate the node,
//! decrement its yield, credit the harvester's inventory and append the
//! audit log. The store's single-writer model serializes concurrent
//! harvests, so two that together exceed the remaining yield produce
//! exactly one success; the other observes [`Error::Insufficient`].

use std::sync::Arc;

use tracing::info;

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::store::{
    txn_append_harvest, txn_credit_inventory, txn_read_node, txn_write_node, InventoryEntry,
    Store, StoreError,
};
use crate::template::TemplateSet;
use crate::util::now_secs;


/// Retry budget for transient storage contention before surfacing
/// [`Error::Conflict`].
const TXN_RETRIES: usize = 3;

/// Respawn delay applied when a node's resource kind has no template in the
/// active set (a template was removed from a live deployment).
const FALLBACK_RESPAWN_DELAY_SECS: u64 = 3600;


/// Caller identity, already validated by the authentication collaborator.
/// The engine never sees credentials, only this pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub character_id: u64,
    pub user_id: u64,
}

/// Outcome of a committed harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestResult {
    pub node_id: u64,
    /// Amount actually granted; always the full requested amount, partial
    /// harvests do not exist.
    pub granted: u32,
    pub new_yield: u32,
    /// The inventory row after the credit.
    pub inventory: InventoryEntry,
}


/// The harvest engine.
pub struct HarvestEngine {
    store: Arc<Store>,
    templates: Arc<TemplateSet>,
}

impl HarvestEngine {

    pub fn new(store: Arc<Store>, templates: Arc<TemplateSet>) -> Self {
        Self { store, templates }
    }

    /// Harvest `amount` units from a node into the caller's inventory.
    ///
    /// Fails with [`Error::NotFound`] for an unknown node,
    /// [`Error::Unavailable`] while the node awaits respawn and
    /// [`Error::Insufficient`] when the amount exceeds the current yield;
    /// in every failure case nothing was committed.
    pub fn harvest(
        &self,
        caller: Caller,
        node_id: u64,
        amount: u32,
        cancel: &CancelToken,
    ) -> Result<HarvestResult, Error> {

        if amount == 0 {
            return Err(Error::InvalidArgument("harvest amount must be positive".into()));
        }
        if caller.character_id == 0 || caller.user_id == 0 {
            return Err(Error::InvalidArgument("missing caller identity".into()));
        }

        let mut attempts = 0;
        loop {
            cancel.check()?;
            match self.try_harvest(caller, node_id, amount, now_secs()) {
                Err(Error::Internal(err)) if err.is_transient() => {
                    attempts += 1;
                    if attempts > TXN_RETRIES {
                        return Err(Error::Conflict);
                    }
                }
                other => return other,
            }
        }

    }

    fn try_harvest(
        &self,
        caller: Caller,
        node_id: u64,
        amount: u32,
        now: u64,
    ) -> Result<HarvestResult, Error> {

        let txn = self.store.begin_write()?;

        let mut node = txn_read_node(&txn, node_id)?.ok_or(Error::NotFound("node"))?;
        if !node.is_active {
            return Err(Error::Unavailable);
        }
        if node.current_yield < amount {
            return Err(Error::Insufficient { requested: amount, available: node.current_yield });
        }

        node.current_yield -= amount;
        node.last_harvest = now;
        if node.current_yield == 0 {
            let delay = self
                .templates
                .for_kind(node.kind)
                .map(|template| template.respawn_delay_secs)
                .unwrap_or(FALLBACK_RESPAWN_DELAY_SECS);
            node.is_active = false;
            node.respawn_timer = now + delay;
        }
        txn_write_node(&txn, &node)?;

        let inventory =
            txn_credit_inventory(&txn, caller.character_id, node.kind.item_id(), amount as u64, now)?;
        txn_append_harvest(&txn, caller.character_id, node_id, amount, now)?;

        txn.commit().map_err(StoreError::from)?;

        info!(
            character = caller.character_id,
            user = caller.user_id,
            node = node_id,
            kind = node.kind.name(),
            amount,
            new_yield = node.current_yield,
            "harvest committed",
        );

        Ok(HarvestResult {
            node_id,
            granted: amount,
            new_yield: node.current_yield,
            inventory,
        })

    }

}
