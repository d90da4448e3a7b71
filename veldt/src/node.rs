//! Resource node model and the node service wiring generation to
//! persistence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::chunk::Chunk;
use crate::engine::NodeIntegrator;
use crate::error::Error;
use crate::gen::{GenConfig, NodeGenerator};
use crate::store::{Store, World};
use crate::template::{NodeQuality, ResourceKind, SpawnBehavior, TemplateSet};


/// A harvestable resource node pinned to one cell of a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Synthetic identifier.
    pub id: u64,
    /// Chunk coordinates.
    pub cx: i32,
    pub cy: i32,
    /// Cell coordinates inside the chunk, in `[0, 31]`.
    pub local_x: u8,
    pub local_y: u8,
    pub kind: ResourceKind,
    pub quality: NodeQuality,
    /// Groups sibling nodes spawned by the same cluster event.
    pub cluster_id: u64,
    /// Number of nodes in the spawn cluster.
    pub size: u8,
    /// Remaining yield; never exceeds `max_yield` and never goes negative.
    pub current_yield: u32,
    pub max_yield: u32,
    /// Yield restored per regeneration sweep.
    pub regeneration_rate: u32,
    pub behavior: SpawnBehavior,
    /// Absolute respawn eligibility time (unix seconds), zero when unset.
    pub respawn_timer: u64,
    pub is_active: bool,
    /// Unix seconds of the last harvest; the creation time before any.
    pub last_harvest: u64,
    pub created_at: u64,
}

/// A generated node before the store assigns identifiers and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBlueprint {
    pub local_x: u8,
    pub local_y: u8,
    pub kind: ResourceKind,
    pub quality: NodeQuality,
    /// Cluster ordinal within the chunk; the store maps it to a global id.
    pub cluster: u16,
    /// Number of nodes in the cluster this blueprint belongs to.
    pub size: u8,
    /// Initial yield, already scaled by quality. Becomes both
    /// `current_yield` and `max_yield`.
    pub initial_yield: u32,
    pub regeneration_rate: u32,
    pub behavior: SpawnBehavior,
}


/// Resource-node service: deterministic generation wired to one-time
/// persistence. Implements the integrator interface the chunk engine
/// consumes, which keeps the engine free of any dependency on this module.
pub struct NodeService {
    store: Arc<Store>,
    templates: Arc<TemplateSet>,
    cfg: GenConfig,
    /// Generators cached per world seed.
    generators: Mutex<HashMap<i64, Arc<NodeGenerator>>>,
}

impl NodeService {

    pub fn new(store: Arc<Store>, templates: Arc<TemplateSet>, cfg: GenConfig) -> Self {
        Self {
            store,
            templates,
            cfg,
            generators: Mutex::new(HashMap::new()),
        }
    }

    fn generator(&self, world_seed: i64) -> Arc<NodeGenerator> {
        let mut generators = self.generators.lock().expect("generator cache poisoned");
        Arc::clone(generators.entry(world_seed).or_insert_with(|| {
            Arc::new(NodeGenerator::new(world_seed, &self.templates, self.cfg))
        }))
    }

}

impl NodeIntegrator for NodeService {

    fn attach_nodes(
        &self,
        world: &World,
        chunk: &Chunk,
        cancel: &CancelToken,
    ) -> Result<Vec<ResourceNode>, Error> {

        cancel.check()?;

        // Fast path: the chunk was integrated before, read the stored rows.
        if self.store.chunk_nodes_generated(world.id, chunk.cx, chunk.cy)? {
            return self.store.nodes_in_chunk(chunk.cx, chunk.cy);
        }

        let generator = self.generator(world.seed);
        let blueprints = generator.generate(chunk.cx, chunk.cy, &chunk.terrain);
        debug!(cx = chunk.cx, cy = chunk.cy, count = blueprints.len(), "generated resource nodes");

        cancel.check()?;

        // Persistence failures must not fail chunk retrieval: the chunk is
        // returned without nodes and the failure is recorded.
        match self.store.persist_generated_nodes(
            world.id,
            chunk.cx,
            chunk.cy,
            &blueprints,
            chunk.generated_at,
        ) {
            Ok(Some(nodes)) => Ok(nodes),
            // Another writer integrated the chunk first; adopt its rows.
            Ok(None) => self.store.nodes_in_chunk(chunk.cx, chunk.cy),
            Err(err) => {
                warn!(
                    cx = chunk.cx,
                    cy = chunk.cy,
                    %err,
                    "resource node persistence failed, returning chunk without nodes",
                );
                Ok(Vec::new())
            }
        }

    }

}
