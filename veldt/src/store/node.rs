//! Resource node rows: creation, queries and yield state updates.

use redb::{ReadableTable, WriteTransaction};
use tracing::debug;

use crate::chunk::CHUNK_WIDTH;
use crate::error::Error;
use crate::node::{NodeBlueprint, ResourceNode};
use crate::template::ResourceKind;

use super::{
    decode_row, encode_row, next_seq, next_seq_block, Store, StoreError, NODES, NODE_CLUSTERS,
    NODE_KINDS, NODE_MARKERS, NODE_POSITIONS, SEQ_CLUSTER, SEQ_NODE,
};


/// Register a node in the secondary indexes inside an open write
/// transaction.
fn txn_index_node(txn: &WriteTransaction, node: &ResourceNode) -> Result<(), StoreError> {
    let mut kinds = txn.open_table(NODE_KINDS)?;
    kinds.insert((node.kind.item_id(), node.id), ())?;
    drop(kinds);
    let mut clusters = txn.open_table(NODE_CLUSTERS)?;
    clusters.insert((node.cluster_id, node.id), ())?;
    Ok(())
}


/// Read a node row inside an open write transaction.
pub(crate) fn txn_read_node(
    txn: &WriteTransaction,
    id: u64,
) -> Result<Option<ResourceNode>, StoreError> {
    let nodes = txn.open_table(NODES)?;
    let result = match nodes.get(&id)? {
        Some(guard) => Ok(Some(decode_row(&guard.value())?)),
        None => Ok(None),
    };
    result
}

/// Write a node row inside an open write transaction.
pub(crate) fn txn_write_node(txn: &WriteTransaction, node: &ResourceNode) -> Result<(), StoreError> {
    let mut nodes = txn.open_table(NODES)?;
    nodes.insert(node.id, encode_row(node)?)?;
    Ok(())
}

fn build_node(
    cx: i32,
    cy: i32,
    blueprint: &NodeBlueprint,
    id: u64,
    cluster_id: u64,
    now: u64,
) -> ResourceNode {
    ResourceNode {
        id,
        cx,
        cy,
        local_x: blueprint.local_x,
        local_y: blueprint.local_y,
        kind: blueprint.kind,
        quality: blueprint.quality,
        cluster_id,
        size: blueprint.size,
        current_yield: blueprint.initial_yield,
        max_yield: blueprint.initial_yield,
        regeneration_rate: blueprint.regeneration_rate,
        behavior: blueprint.behavior,
        respawn_timer: 0,
        is_active: true,
        last_harvest: now,
        created_at: now,
    }
}

fn validate_blueprint(blueprint: &NodeBlueprint) -> Result<(), Error> {
    if blueprint.local_x as usize >= CHUNK_WIDTH || blueprint.local_y as usize >= CHUNK_WIDTH {
        return Err(Error::InvalidArgument(format!(
            "local coordinates [{}, {}] outside the chunk",
            blueprint.local_x, blueprint.local_y,
        )));
    }
    if blueprint.initial_yield == 0 {
        return Err(Error::InvalidArgument("node yield must be at least 1".into()));
    }
    Ok(())
}


impl Store {

    /// Create a single node from a blueprint, allocating its id and a fresh
    /// cluster id. Fails with [`Error::AlreadyExists`] when the cell is
    /// occupied.
    pub fn create_node(
        &self,
        cx: i32,
        cy: i32,
        blueprint: &NodeBlueprint,
        now: u64,
    ) -> Result<ResourceNode, Error> {

        validate_blueprint(blueprint)?;

        let txn = self.begin_write()?;
        let node;
        {
            let mut positions = txn.open_table(NODE_POSITIONS).map_err(StoreError::from)?;
            let key = (cx, cy, blueprint.local_x, blueprint.local_y);
            if positions.get(&key).map_err(StoreError::from)?.is_some() {
                return Err(Error::AlreadyExists(format!(
                    "node at chunk {cx},{cy} cell [{}, {}]",
                    blueprint.local_x, blueprint.local_y,
                )));
            }

            let id = next_seq(&txn, SEQ_NODE)?;
            let cluster_id = next_seq(&txn, SEQ_CLUSTER)?;
            node = build_node(cx, cy, blueprint, id, cluster_id, now);

            positions.insert(key, id).map_err(StoreError::from)?;
            txn_write_node(&txn, &node)?;
            txn_index_node(&txn, &node)?;
        }
        txn.commit().map_err(StoreError::from)?;

        Ok(node)

    }

    /// Persist the generated nodes of one chunk, exactly once.
    ///
    /// Returns `Ok(None)` when another writer already integrated the chunk;
    /// the caller then reads the committed rows instead. The generation
    /// marker commits atomically with the batch, so a crash mid-way leaves
    /// the chunk eligible for one clean retry.
    pub fn persist_generated_nodes(
        &self,
        world_id: u64,
        cx: i32,
        cy: i32,
        blueprints: &[NodeBlueprint],
        now: u64,
    ) -> Result<Option<Vec<ResourceNode>>, Error> {

        for blueprint in blueprints {
            validate_blueprint(blueprint)?;
        }

        let txn = self.begin_write()?;
        let mut created = Vec::with_capacity(blueprints.len());
        {
            let mut markers = txn.open_table(NODE_MARKERS).map_err(StoreError::from)?;
            if markers.get(&(world_id, cx, cy)).map_err(StoreError::from)?.is_some() {
                return Ok(None);
            }
            markers
                .insert((world_id, cx, cy), blueprints.len() as u64)
                .map_err(StoreError::from)?;
            drop(markers);

            let first_id = next_seq_block(&txn, SEQ_NODE, blueprints.len() as u64)?;
            let cluster_count = blueprints
                .iter()
                .map(|blueprint| blueprint.cluster as u64 + 1)
                .max()
                .unwrap_or(0);
            let first_cluster_id = next_seq_block(&txn, SEQ_CLUSTER, cluster_count)?;

            let mut nodes = txn.open_table(NODES).map_err(StoreError::from)?;
            let mut positions = txn.open_table(NODE_POSITIONS).map_err(StoreError::from)?;

            for (offset, blueprint) in blueprints.iter().enumerate() {
                let node = build_node(
                    cx,
                    cy,
                    blueprint,
                    first_id + offset as u64,
                    first_cluster_id + blueprint.cluster as u64,
                    now,
                );
                let key = (cx, cy, node.local_x, node.local_y);
                if positions.insert(key, node.id).map_err(StoreError::from)?.is_some() {
                    return Err(Error::AlreadyExists(format!(
                        "node at chunk {cx},{cy} cell [{}, {}]",
                        node.local_x, node.local_y,
                    )));
                }
                nodes.insert(node.id, encode_row(&node)?).map_err(StoreError::from)?;
                txn_index_node(&txn, &node)?;
                created.push(node);
            }
        }
        txn.commit().map_err(StoreError::from)?;

        debug!(world = world_id, cx, cy, count = created.len(), "persisted chunk nodes");
        Ok(Some(created))

    }

    /// True once the chunk's nodes were generated and persisted.
    pub fn chunk_nodes_generated(&self, world_id: u64, cx: i32, cy: i32) -> Result<bool, Error> {
        let txn = self.begin_read()?;
        let markers = txn.open_table(NODE_MARKERS).map_err(StoreError::from)?;
        Ok(markers.get(&(world_id, cx, cy)).map_err(StoreError::from)?.is_some())
    }

    /// Fetch a node by id.
    pub fn get_node(&self, id: u64) -> Result<ResourceNode, Error> {
        let txn = self.begin_read()?;
        let nodes = txn.open_table(NODES).map_err(StoreError::from)?;
        match nodes.get(&id).map_err(StoreError::from)? {
            Some(guard) => Ok(decode_row(&guard.value())?),
            None => Err(Error::NotFound("node")),
        }
    }

    /// All nodes of one chunk, ordered by local coordinates.
    pub fn nodes_in_chunk(&self, cx: i32, cy: i32) -> Result<Vec<ResourceNode>, Error> {
        let txn = self.begin_read()?;
        let positions = txn.open_table(NODE_POSITIONS).map_err(StoreError::from)?;
        let nodes = txn.open_table(NODES).map_err(StoreError::from)?;

        let mut list = Vec::new();
        let start = (cx, cy, 0u8, 0u8);
        let end = (cx, cy, (CHUNK_WIDTH - 1) as u8, (CHUNK_WIDTH - 1) as u8);
        for row in positions.range(start..=end).map_err(StoreError::from)? {
            let (_, id) = row.map_err(StoreError::from)?;
            let id = id.value();
            match nodes.get(&id).map_err(StoreError::from)? {
                Some(guard) => list.push(decode_row::<ResourceNode>(&guard.value())?),
                None => {
                    return Err(StoreError::Inconsistent(format!(
                        "position index references missing node {id}",
                    )).into());
                }
            }
        }
        Ok(list)
    }

    /// All nodes in the inclusive chunk rectangle.
    pub fn nodes_in_rect(
        &self,
        min_cx: i32,
        max_cx: i32,
        min_cy: i32,
        max_cy: i32,
    ) -> Result<Vec<ResourceNode>, Error> {

        if max_cx < min_cx || max_cy < min_cy {
            return Ok(Vec::new());
        }

        let txn = self.begin_read()?;
        let positions = txn.open_table(NODE_POSITIONS).map_err(StoreError::from)?;
        let nodes = txn.open_table(NODES).map_err(StoreError::from)?;

        let mut list = Vec::new();
        let start = (min_cx, i32::MIN, 0u8, 0u8);
        let end = (max_cx, i32::MAX, u8::MAX, u8::MAX);
        for row in positions.range(start..=end).map_err(StoreError::from)? {
            let (key, id) = row.map_err(StoreError::from)?;
            let (_, cy, _, _) = key.value();
            if cy < min_cy || cy > max_cy {
                continue;
            }
            let id = id.value();
            match nodes.get(&id).map_err(StoreError::from)? {
                Some(guard) => list.push(decode_row::<ResourceNode>(&guard.value())?),
                None => {
                    return Err(StoreError::Inconsistent(format!(
                        "position index references missing node {id}",
                    )).into());
                }
            }
        }
        Ok(list)

    }

    /// All nodes in a small batch of chunks.
    pub fn nodes_in_chunks(&self, coords: &[(i32, i32)]) -> Result<Vec<ResourceNode>, Error> {
        let mut list = Vec::new();
        for &(cx, cy) in coords {
            list.extend(self.nodes_in_chunk(cx, cy)?);
        }
        Ok(list)
    }

    /// Atomically decrement a node's yield. Fails with
    /// [`Error::Insufficient`] unless `current_yield >= amount` at commit
    /// time; the node stays untouched in that case.
    pub fn decrement_yield(&self, id: u64, amount: u32, now: u64) -> Result<ResourceNode, Error> {

        if amount == 0 {
            return Err(Error::InvalidArgument("decrement amount must be positive".into()));
        }

        let txn = self.begin_write()?;
        let mut node = txn_read_node(&txn, id)?.ok_or(Error::NotFound("node"))?;
        if node.current_yield < amount {
            return Err(Error::Insufficient { requested: amount, available: node.current_yield });
        }
        node.current_yield -= amount;
        node.last_harvest = now;
        txn_write_node(&txn, &node)?;
        txn.commit().map_err(StoreError::from)?;
        Ok(node)

    }

    /// Mark a node depleted: inactive with an absolute respawn time.
    pub fn deplete_node(&self, id: u64, respawn_at: u64) -> Result<ResourceNode, Error> {
        let txn = self.begin_write()?;
        let mut node = txn_read_node(&txn, id)?.ok_or(Error::NotFound("node"))?;
        node.is_active = false;
        node.respawn_timer = respawn_at;
        txn_write_node(&txn, &node)?;
        txn.commit().map_err(StoreError::from)?;
        Ok(node)
    }

    /// Return a node to service at full yield.
    pub fn reactivate_node(&self, id: u64) -> Result<ResourceNode, Error> {
        let txn = self.begin_write()?;
        let mut node = txn_read_node(&txn, id)?.ok_or(Error::NotFound("node"))?;
        node.current_yield = node.max_yield;
        node.is_active = true;
        node.respawn_timer = 0;
        txn_write_node(&txn, &node)?;
        txn.commit().map_err(StoreError::from)?;
        Ok(node)
    }

    /// Delete every node of a chunk along with its generation marker, so the
    /// next integration regenerates them. Returns the number of deleted
    /// nodes.
    pub fn delete_chunk_nodes(&self, world_id: u64, cx: i32, cy: i32) -> Result<usize, Error> {

        let txn = self.begin_write()?;
        let deleted;
        {
            let mut positions = txn.open_table(NODE_POSITIONS).map_err(StoreError::from)?;
            let start = (cx, cy, 0u8, 0u8);
            let end = (cx, cy, (CHUNK_WIDTH - 1) as u8, (CHUNK_WIDTH - 1) as u8);

            let mut doomed = Vec::new();
            for row in positions.range(start..=end).map_err(StoreError::from)? {
                let (key, id) = row.map_err(StoreError::from)?;
                doomed.push((key.value(), id.value()));
            }

            let mut nodes = txn.open_table(NODES).map_err(StoreError::from)?;
            let mut kinds = txn.open_table(NODE_KINDS).map_err(StoreError::from)?;
            let mut clusters = txn.open_table(NODE_CLUSTERS).map_err(StoreError::from)?;
            for &(key, id) in &doomed {
                positions.remove(&key).map_err(StoreError::from)?;
                if let Some(row) = nodes.remove(&id).map_err(StoreError::from)? {
                    let node: ResourceNode = decode_row(&row.value())?;
                    kinds.remove(&(node.kind.item_id(), id)).map_err(StoreError::from)?;
                    clusters.remove(&(node.cluster_id, id)).map_err(StoreError::from)?;
                }
            }
            deleted = doomed.len();

            let mut markers = txn.open_table(NODE_MARKERS).map_err(StoreError::from)?;
            markers.remove(&(world_id, cx, cy)).map_err(StoreError::from)?;
        }
        txn.commit().map_err(StoreError::from)?;

        Ok(deleted)

    }

    /// All nodes of one resource kind, ordered by node id.
    pub fn nodes_by_kind(&self, kind: ResourceKind) -> Result<Vec<ResourceNode>, Error> {
        let txn = self.begin_read()?;
        let kinds = txn.open_table(NODE_KINDS).map_err(StoreError::from)?;
        let nodes = txn.open_table(NODES).map_err(StoreError::from)?;

        let item_id = kind.item_id();
        let mut list = Vec::new();
        let range = kinds
            .range((item_id, u64::MIN)..=(item_id, u64::MAX))
            .map_err(StoreError::from)?;
        for row in range {
            let (key, _) = row.map_err(StoreError::from)?;
            let (_, id) = key.value();
            match nodes.get(&id).map_err(StoreError::from)? {
                Some(guard) => list.push(decode_row::<ResourceNode>(&guard.value())?),
                None => {
                    return Err(StoreError::Inconsistent(format!(
                        "kind index references missing node {id}",
                    )).into());
                }
            }
        }
        Ok(list)
    }

    /// All sibling nodes of one spawn cluster, ordered by node id.
    pub fn nodes_in_cluster(&self, cluster_id: u64) -> Result<Vec<ResourceNode>, Error> {
        let txn = self.begin_read()?;
        let clusters = txn.open_table(NODE_CLUSTERS).map_err(StoreError::from)?;
        let nodes = txn.open_table(NODES).map_err(StoreError::from)?;

        let mut list = Vec::new();
        let range = clusters
            .range((cluster_id, u64::MIN)..=(cluster_id, u64::MAX))
            .map_err(StoreError::from)?;
        for row in range {
            let (key, _) = row.map_err(StoreError::from)?;
            let (_, id) = key.value();
            match nodes.get(&id).map_err(StoreError::from)? {
                Some(guard) => list.push(decode_row::<ResourceNode>(&guard.value())?),
                None => {
                    return Err(StoreError::Inconsistent(format!(
                        "cluster index references missing node {id}",
                    )).into());
                }
            }
        }
        Ok(list)
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::template::{NodeQuality, ResourceKind, SpawnBehavior};

    fn blueprint(local_x: u8, local_y: u8, initial_yield: u32) -> NodeBlueprint {
        NodeBlueprint {
            local_x,
            local_y,
            kind: ResourceKind::Herb,
            quality: NodeQuality::Common,
            cluster: 0,
            size: 1,
            initial_yield,
            regeneration_rate: 4,
            behavior: SpawnBehavior::Random,
        }
    }

    #[test]
    fn create_get_and_conflict() {
        let store = Store::in_memory().unwrap();
        let node = store.create_node(0, 0, &blueprint(4, 9, 10), 100).unwrap();
        assert_eq!(node.current_yield, 10);
        assert_eq!(node.max_yield, 10);
        assert!(node.is_active);
        assert_eq!(node.last_harvest, 100);
        assert_eq!(store.get_node(node.id).unwrap(), node);

        assert!(matches!(
            store.create_node(0, 0, &blueprint(4, 9, 5), 200),
            Err(Error::AlreadyExists(_)),
        ));
        assert!(matches!(
            store.create_node(0, 0, &blueprint(32, 0, 5), 200),
            Err(Error::InvalidArgument(_)),
        ));
        assert!(matches!(store.get_node(999), Err(Error::NotFound("node"))));
    }

    #[test]
    fn chunk_and_rect_queries() {
        let store = Store::in_memory().unwrap();
        store.create_node(0, 0, &blueprint(0, 0, 5), 1).unwrap();
        store.create_node(0, 0, &blueprint(31, 31, 5), 1).unwrap();
        store.create_node(1, 0, &blueprint(2, 2, 5), 1).unwrap();
        store.create_node(0, 2, &blueprint(3, 3, 5), 1).unwrap();

        assert_eq!(store.nodes_in_chunk(0, 0).unwrap().len(), 2);
        assert_eq!(store.nodes_in_chunk(5, 5).unwrap().len(), 0);
        assert_eq!(store.nodes_in_rect(0, 1, 0, 0).unwrap().len(), 3);
        assert_eq!(store.nodes_in_rect(0, 0, 0, 2).unwrap().len(), 3);
        // Inverted rectangles are empty, not an error.
        assert_eq!(store.nodes_in_rect(1, 0, 0, 0).unwrap().len(), 0);
        assert_eq!(store.nodes_in_chunks(&[(0, 0), (1, 0)]).unwrap().len(), 3);
    }

    #[test]
    fn decrement_enforces_available_yield() {
        let store = Store::in_memory().unwrap();
        let node = store.create_node(0, 0, &blueprint(1, 1, 10), 100).unwrap();

        let node = store.decrement_yield(node.id, 7, 150).unwrap();
        assert_eq!(node.current_yield, 3);
        assert_eq!(node.last_harvest, 150);

        assert!(matches!(
            store.decrement_yield(node.id, 7, 160),
            Err(Error::Insufficient { requested: 7, available: 3 }),
        ));
        // The failed decrement left the row untouched.
        assert_eq!(store.get_node(node.id).unwrap().current_yield, 3);
        assert!(matches!(
            store.decrement_yield(node.id, 0, 160),
            Err(Error::InvalidArgument(_)),
        ));
    }

    #[test]
    fn deplete_and_reactivate() {
        let store = Store::in_memory().unwrap();
        let node = store.create_node(0, 0, &blueprint(1, 1, 10), 100).unwrap();
        store.decrement_yield(node.id, 10, 150).unwrap();

        let node = store.deplete_node(node.id, 150 + 3600).unwrap();
        assert!(!node.is_active);
        assert_eq!(node.respawn_timer, 3750);

        let node = store.reactivate_node(node.id).unwrap();
        assert!(node.is_active);
        assert_eq!(node.current_yield, node.max_yield);
        assert_eq!(node.respawn_timer, 0);
    }

    #[test]
    fn batch_persistence_is_one_time() {
        let store = Store::in_memory().unwrap();
        let blueprints = vec![blueprint(1, 1, 5), blueprint(2, 1, 5)];

        assert!(!store.chunk_nodes_generated(1, 0, 0).unwrap());
        let created = store.persist_generated_nodes(1, 0, 0, &blueprints, 100).unwrap().unwrap();
        assert_eq!(created.len(), 2);
        assert!(store.chunk_nodes_generated(1, 0, 0).unwrap());
        // Every blueprint shares cluster ordinal 0, so they share a cluster id.
        assert_eq!(created[0].cluster_id, created[1].cluster_id);

        // A second integration attempt is refused without touching rows.
        assert!(store.persist_generated_nodes(1, 0, 0, &blueprints, 200).unwrap().is_none());
        assert_eq!(store.nodes_in_chunk(0, 0).unwrap(), created);
    }

    #[test]
    fn kind_and_cluster_indexes() {
        let store = Store::in_memory().unwrap();
        let herb = store.create_node(0, 0, &blueprint(1, 1, 5), 100).unwrap();
        let mut pearl_blueprint = blueprint(2, 1, 5);
        pearl_blueprint.kind = ResourceKind::Pearl;
        let pearl = store.create_node(0, 0, &pearl_blueprint, 100).unwrap();

        let herbs = store.nodes_by_kind(ResourceKind::Herb).unwrap();
        assert_eq!(herbs, vec![herb.clone()]);
        assert_eq!(store.nodes_by_kind(ResourceKind::Pearl).unwrap(), vec![pearl]);
        assert!(store.nodes_by_kind(ResourceKind::Flint).unwrap().is_empty());

        // Batch-persisted siblings share a cluster and are found through it.
        let siblings = store
            .persist_generated_nodes(1, 4, 4, &[blueprint(1, 1, 5), blueprint(2, 1, 5)], 100)
            .unwrap()
            .unwrap();
        let cluster = store.nodes_in_cluster(siblings[0].cluster_id).unwrap();
        assert_eq!(cluster, siblings);
        // Singly created nodes get their own cluster.
        assert_eq!(store.nodes_in_cluster(herb.cluster_id).unwrap(), vec![herb]);

        // Deleting a chunk clears its index entries.
        store.delete_chunk_nodes(1, 4, 4).unwrap();
        assert!(store.nodes_in_cluster(siblings[0].cluster_id).unwrap().is_empty());
        assert_eq!(store.nodes_by_kind(ResourceKind::Herb).unwrap().len(), 1);
    }

    #[test]
    fn delete_resets_the_marker() {
        let store = Store::in_memory().unwrap();
        let blueprints = vec![blueprint(1, 1, 5), blueprint(2, 1, 5)];
        store.persist_generated_nodes(1, 0, 0, &blueprints, 100).unwrap().unwrap();

        assert_eq!(store.delete_chunk_nodes(1, 0, 0).unwrap(), 2);
        assert!(store.nodes_in_chunk(0, 0).unwrap().is_empty());
        assert!(!store.chunk_nodes_generated(1, 0, 0).unwrap());

        // Regeneration is possible again.
        assert!(store.persist_generated_nodes(1, 0, 0, &blueprints, 300).unwrap().is_some());
    }

}
