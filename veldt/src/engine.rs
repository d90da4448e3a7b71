//! Chunk engine: on-demand materialization and parallel region fetching.
//!
//! Chunks materialize at most once per key: terrain is generated and encoded
//! outside any transaction, then committed with insert-ignore-then-read so
//! concurrent misses for the same key all observe the winner's row. Region
//! queries fan the coordinates over a bounded pool of worker threads that
//! share one cancellation signal and abort together on the first error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::bounded;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::chunk::{Chunk, ChunkWithNodes};
use crate::codec;
use crate::error::Error;
use crate::gen::generate_terrain;
use crate::node::ResourceNode;
use crate::store::{Store, StoreError, World};
use crate::terrain::TerrainShaper;
use crate::util::now_secs;


/// Provides the resource nodes attached to a chunk.
///
/// Implemented by the node service in a higher layer, so the engine never
/// depends on the service types directly. Implementations recover node
/// generation failures internally (empty list plus a recorded warning) and
/// only surface storage failures.
pub trait NodeIntegrator: Send + Sync {
    /// Return the nodes of the given chunk, generating and persisting them
    /// the first time the chunk is seen.
    fn attach_nodes(
        &self,
        world: &World,
        chunk: &Chunk,
        cancel: &CancelToken,
    ) -> Result<Vec<ResourceNode>, Error>;
}


/// Engine tunables.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Upper bound on region query workers; the effective pool size is
    /// `min(worker_cap, coordinate count)`.
    pub worker_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { worker_cap: 4 }
    }
}


/// The chunk engine. Cheap to share behind an [`Arc`]; all methods take
/// `&self`.
pub struct ChunkEngine<I: NodeIntegrator> {
    store: Arc<Store>,
    integrator: Arc<I>,
    worker_cap: usize,
    /// Terrain shapers cached per world seed.
    shapers: Mutex<HashMap<i64, Arc<TerrainShaper>>>,
}

impl<I: NodeIntegrator> ChunkEngine<I> {

    pub fn new(store: Arc<Store>, integrator: Arc<I>, config: EngineConfig) -> Self {
        Self {
            store,
            integrator,
            worker_cap: config.worker_cap.max(1),
            shapers: Mutex::new(HashMap::new()),
        }
    }

    fn shaper(&self, seed: i64) -> Arc<TerrainShaper> {
        let mut shapers = self.shapers.lock().expect("shaper cache poisoned");
        Arc::clone(shapers.entry(seed).or_insert_with(|| Arc::new(TerrainShaper::new(seed))))
    }

    /// Fetch a chunk with its resource nodes, materializing it on first
    /// demand.
    pub fn get_or_create(
        &self,
        world: &World,
        cx: i32,
        cy: i32,
        cancel: &CancelToken,
    ) -> Result<ChunkWithNodes, Error> {

        cancel.check()?;

        // Fast path: the chunk is already materialized.
        if let Some(blob) = self.store.get_chunk_blob(world.id, cx, cy)? {
            let chunk = self.decode_blob(world, &blob)?;
            let nodes = self.integrator.attach_nodes(world, &chunk, cancel)?;
            return Ok(ChunkWithNodes { chunk, nodes });
        }

        cancel.check()?;

        let shaper = self.shaper(world.seed);
        let chunk = Chunk {
            cx,
            cy,
            seed: world.seed,
            generated_at: now_secs(),
            terrain: generate_terrain(&shaper, cx, cy),
        };
        let blob = codec::encode_chunk(&chunk).map_err(StoreError::from)?;

        cancel.check()?;

        let (committed, created) = self.store.insert_chunk_blob(world.id, cx, cy, blob)?;
        let chunk = if created {
            debug!(world = world.id, cx, cy, "materialized chunk");
            chunk
        } else {
            // Lost the race; adopt the winner's row so every caller observes
            // the same terrain.
            self.decode_blob(world, &committed)?
        };

        let nodes = self.integrator.attach_nodes(world, &chunk, cancel)?;
        Ok(ChunkWithNodes { chunk, nodes })

    }

    /// All chunks in the inclusive rectangle. Empty when the rectangle is
    /// inverted on either axis. Return order is not guaranteed.
    pub fn get_range(
        &self,
        world: &World,
        min_x: i32,
        max_x: i32,
        min_y: i32,
        max_y: i32,
        cancel: &CancelToken,
    ) -> Result<Vec<ChunkWithNodes>, Error> {

        if max_x < min_x || max_y < min_y {
            return Ok(Vec::new());
        }

        let mut coords = Vec::new();
        for cy in min_y..=max_y {
            for cx in min_x..=max_x {
                coords.push((cx, cy));
            }
        }
        self.fetch_many(world, coords, cancel)

    }

    /// All chunks at Manhattan distance at most `radius` from the center.
    /// Return order is not guaranteed.
    pub fn get_radius(
        &self,
        world: &World,
        cx: i32,
        cy: i32,
        radius: i32,
        cancel: &CancelToken,
    ) -> Result<Vec<ChunkWithNodes>, Error> {

        if radius < 0 {
            return Err(Error::InvalidArgument(format!("negative radius {radius}")));
        }

        let mut coords = Vec::new();
        for dy in -radius..=radius {
            let remaining = radius - dy.abs();
            for dx in -remaining..=remaining {
                coords.push((cx + dx, cy + dy));
            }
        }
        self.fetch_many(world, coords, cancel)

    }

    /// Fan a coordinate set over a bounded worker pool. Workers pull from a
    /// coordinate channel and push into a result channel; the error channel
    /// is bounded by the pool size and the first error aborts every worker.
    fn fetch_many(
        &self,
        world: &World,
        coords: Vec<(i32, i32)>,
        cancel: &CancelToken,
    ) -> Result<Vec<ChunkWithNodes>, Error> {

        if coords.is_empty() {
            return Ok(Vec::new());
        }
        cancel.check()?;

        let worker_count = self.worker_cap.min(coords.len());

        let (coord_sender, coord_receiver) = bounded(coords.len());
        let (chunk_sender, chunk_receiver) = bounded(coords.len());
        let (error_sender, error_receiver) = bounded::<Error>(worker_count);

        for coord in coords {
            coord_sender.send(coord).expect("channel sized for every coordinate");
        }
        drop(coord_sender);

        let abort = AtomicBool::new(false);

        thread::scope(|scope| {
            for index in 0..worker_count {

                let coord_receiver = coord_receiver.clone();
                let chunk_sender = chunk_sender.clone();
                let error_sender = error_sender.clone();
                let abort = &abort;

                thread::Builder::new()
                    .name(format!("Chunk Region Worker #{index}"))
                    .spawn_scoped(scope, move || {
                        for (cx, cy) in coord_receiver {
                            if abort.load(Ordering::Relaxed) || cancel.is_canceled() {
                                break;
                            }
                            match self.get_or_create(world, cx, cy, cancel) {
                                Ok(chunk) => {
                                    if chunk_sender.send(chunk).is_err() {
                                        break;
                                    }
                                }
                                Err(err) => {
                                    // A full channel means another worker
                                    // already reported an error.
                                    let _ = error_sender.try_send(err);
                                    abort.store(true, Ordering::Relaxed);
                                    break;
                                }
                            }
                        }
                    })
                    .expect("region worker threads can always be spawned");

            }
        });

        drop(chunk_sender);
        drop(error_sender);

        if let Ok(err) = error_receiver.try_recv() {
            warn!(world = world.id, %err, "region query aborted");
            return Err(err);
        }
        cancel.check()?;

        Ok(chunk_receiver.try_iter().collect())

    }

    fn decode_blob(&self, world: &World, blob: &[u8]) -> Result<Chunk, Error> {
        let chunk = codec::decode_chunk(blob).map_err(StoreError::from)?;
        if chunk.seed != world.seed {
            warn!(
                world = world.id,
                cx = chunk.cx,
                cy = chunk.cy,
                "chunk blob seed echo does not match the world seed",
            );
        }
        Ok(chunk)
    }

}
