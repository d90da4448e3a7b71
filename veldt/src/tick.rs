//! Periodic regeneration and respawn sweeps.
//!
//! Each sweep is one write transaction, so it serializes against harvests:
//! a regeneration step can never deplete a node and no reader observes a
//! torn intermediate state. Sweeps apply at most one step per node per run
//! regardless of elapsed wall time, are idempotent across reruns, and a
//! failed row is logged and skipped rather than aborting the process.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use std::io;

use crossbeam_channel::{bounded, select, tick, Sender};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::node::ResourceNode;
use crate::store::{decode_row, encode_row, Store, StoreError, NODES};
use crate::util::now_secs;

use redb::ReadableTable;


/// Sweep cadence configuration.
#[derive(Debug, Clone, Copy)]
pub struct TickConfig {
    pub regen_period: Duration,
    pub respawn_check_period: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            regen_period: Duration::from_secs(3600),
            respawn_check_period: Duration::from_secs(3600),
        }
    }
}


/// Counters reported by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Rows visited.
    pub scanned: usize,
    /// Rows rewritten.
    pub updated: usize,
    /// Rows skipped because they failed to decode.
    pub skipped: usize,
}


/// Runs the periodic node bookkeeping. The sweeps are public so tests and
/// tooling can drive them directly with an explicit clock.
pub struct Sweeper {
    store: Arc<Store>,
}

impl Sweeper {

    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Apply one regeneration step: every active node below its maximum
    /// gains `min(regeneration_rate, max_yield - current_yield)`.
    pub fn run_regen_sweep(&self, now: u64, cancel: &CancelToken) -> Result<SweepStats, Error> {
        let stats = self.sweep_nodes(cancel, |node| {
            if node.is_active && node.current_yield < node.max_yield {
                node.current_yield =
                    (node.current_yield + node.regeneration_rate).min(node.max_yield);
                true
            } else {
                false
            }
        })?;
        debug!(now, ?stats, "regeneration sweep");
        Ok(stats)
    }

    /// Return every inactive node whose respawn time has come back to
    /// service at full yield.
    pub fn run_respawn_sweep(&self, now: u64, cancel: &CancelToken) -> Result<SweepStats, Error> {
        let stats = self.sweep_nodes(cancel, |node| {
            if !node.is_active && node.respawn_timer != 0 && node.respawn_timer <= now {
                node.current_yield = node.max_yield;
                node.is_active = true;
                node.respawn_timer = 0;
                true
            } else {
                false
            }
        })?;
        debug!(now, ?stats, "respawn sweep");
        Ok(stats)
    }

    /// Collect inventory rows that decayed to zero quantity.
    pub fn run_inventory_gc(&self, cancel: &CancelToken) -> Result<usize, Error> {
        cancel.check()?;
        let collected = self.store.collect_empty_inventory_rows()?;
        if collected > 0 {
            debug!(collected, "inventory garbage collection");
        }
        Ok(collected)
    }

    /// Visit every node row in one write transaction, rewriting the ones the
    /// closure mutated. Cancellation aborts the transaction; sweeps are
    /// idempotent, so the next run simply redoes the work.
    fn sweep_nodes(
        &self,
        cancel: &CancelToken,
        mut update: impl FnMut(&mut ResourceNode) -> bool,
    ) -> Result<SweepStats, Error> {

        cancel.check()?;

        let txn = self.store.begin_write()?;
        let mut stats = SweepStats::default();
        {
            let mut nodes = txn.open_table(NODES).map_err(StoreError::from)?;

            let mut rows: Vec<(u64, Vec<u8>)> = Vec::new();
            for row in nodes.iter().map_err(StoreError::from)? {
                let (key, value) = row.map_err(StoreError::from)?;
                rows.push((key.value(), value.value()));
            }

            for (id, bytes) in rows {
                cancel.check()?;
                stats.scanned += 1;
                let mut node: ResourceNode = match decode_row(&bytes) {
                    Ok(node) => node,
                    Err(err) => {
                        warn!(id, %err, "skipping undecodable node row");
                        stats.skipped += 1;
                        continue;
                    }
                };
                if update(&mut node) {
                    nodes.insert(id, encode_row(&node)?).map_err(StoreError::from)?;
                    stats.updated += 1;
                }
            }
        }
        txn.commit().map_err(StoreError::from)?;

        Ok(stats)

    }

}


/// Handle to the background ticker thread driving the sweeps.
pub struct Ticker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl Ticker {

    /// Spawn the ticker thread. Sweeps run on their configured periods until
    /// [`Ticker::stop`] is called; a failing sweep is logged and the ticker
    /// keeps running.
    pub fn spawn(sweeper: Sweeper, config: TickConfig) -> io::Result<Self> {

        let (shutdown, shutdown_receiver) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("World Sweep Ticker".to_owned())
            .spawn(move || {

                let regen = tick(config.regen_period);
                let respawn = tick(config.respawn_check_period);

                let cancel = CancelToken::new();

                loop {
                    select! {
                        recv(regen) -> _ => {
                            if let Err(err) = sweeper.run_regen_sweep(now_secs(), &cancel) {
                                warn!(%err, "regeneration sweep failed");
                            }
                        }
                        recv(respawn) -> _ => {
                            let now = now_secs();
                            if let Err(err) = sweeper.run_respawn_sweep(now, &cancel) {
                                warn!(%err, "respawn sweep failed");
                            }
                            if let Err(err) = sweeper.run_inventory_gc(&cancel) {
                                warn!(%err, "inventory garbage collection failed");
                            }
                        }
                        recv(shutdown_receiver) -> _ => break,
                    }
                }

            })?;

        Ok(Self { shutdown, handle })

    }

    /// Stop the ticker and wait for the thread to exit.
    pub fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.join();
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::node::NodeBlueprint;
    use crate::template::{NodeQuality, ResourceKind, SpawnBehavior};

    fn blueprint(local_x: u8, initial_yield: u32, regeneration_rate: u32) -> NodeBlueprint {
        NodeBlueprint {
            local_x,
            local_y: 0,
            kind: ResourceKind::Herb,
            quality: NodeQuality::Common,
            cluster: 0,
            size: 1,
            initial_yield,
            regeneration_rate,
            behavior: SpawnBehavior::Random,
        }
    }

    fn setup() -> (Arc<Store>, Sweeper) {
        let store = Arc::new(Store::in_memory().unwrap());
        let sweeper = Sweeper::new(Arc::clone(&store));
        (store, sweeper)
    }

    #[test]
    fn regeneration_is_stepwise_and_capped() {
        let (store, sweeper) = setup();
        let node = store.create_node(0, 0, &blueprint(1, 100, 25), 100).unwrap();
        // Bring the node down to 40/100.
        store.decrement_yield(node.id, 60, 150).unwrap();

        for expected in [65u32, 90, 100, 100] {
            sweeper.run_regen_sweep(1000, &CancelToken::new()).unwrap();
            assert_eq!(store.get_node(node.id).unwrap().current_yield, expected);
        }
    }

    #[test]
    fn regeneration_ignores_inactive_nodes() {
        let (store, sweeper) = setup();
        let node = store.create_node(0, 0, &blueprint(1, 50, 10), 100).unwrap();
        store.decrement_yield(node.id, 50, 150).unwrap();
        store.deplete_node(node.id, 150 + 3600).unwrap();

        let stats = sweeper.run_regen_sweep(1000, &CancelToken::new()).unwrap();
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.updated, 0);
        assert_eq!(store.get_node(node.id).unwrap().current_yield, 0);
    }

    #[test]
    fn respawn_waits_for_the_timer() {
        let (store, sweeper) = setup();
        let node = store.create_node(0, 0, &blueprint(1, 50, 10), 100).unwrap();
        store.decrement_yield(node.id, 50, 1000).unwrap();
        store.deplete_node(node.id, 1000 + 3600).unwrap();

        // Half way through the delay: no change.
        sweeper.run_respawn_sweep(1000 + 1800, &CancelToken::new()).unwrap();
        let mid = store.get_node(node.id).unwrap();
        assert!(!mid.is_active);
        assert_eq!(mid.current_yield, 0);

        // Past the timer: back to service at full yield.
        sweeper.run_respawn_sweep(1000 + 3601, &CancelToken::new()).unwrap();
        let respawned = store.get_node(node.id).unwrap();
        assert!(respawned.is_active);
        assert_eq!(respawned.current_yield, 50);
        assert_eq!(respawned.respawn_timer, 0);

        // Idempotent on rerun.
        let stats = sweeper.run_respawn_sweep(1000 + 3602, &CancelToken::new()).unwrap();
        assert_eq!(stats.updated, 0);
    }

    #[test]
    fn sweeps_leave_untouched_nodes_alone() {
        let (store, sweeper) = setup();
        let full = store.create_node(0, 0, &blueprint(1, 30, 5), 100).unwrap();
        let partial = store.create_node(0, 0, &blueprint(2, 30, 5), 100).unwrap();
        store.decrement_yield(partial.id, 8, 200).unwrap();

        let stats = sweeper.run_regen_sweep(500, &CancelToken::new()).unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.updated, 1);
        assert_eq!(store.get_node(full.id).unwrap(), full);
        assert_eq!(store.get_node(partial.id).unwrap().current_yield, 27);
    }

    #[test]
    fn ticker_stops_cleanly() {
        let (_, sweeper) = setup();
        let config = TickConfig {
            regen_period: Duration::from_millis(10),
            respawn_check_period: Duration::from_millis(10),
        };
        let ticker = Ticker::spawn(sweeper, config).unwrap();
        thread::sleep(Duration::from_millis(50));
        ticker.stop();
    }

}
