//! Noise-driven resource node placement.
//!
//! Every template samples its own noise channel over the chunk; the
//! strongest candidate cells seed clusters that grow by randomly picking
//! nearby candidates. All randomness derives from the chunk seed, so the
//! same world seed, coordinates and templates always reproduce the same
//! layout.

use crate::biome::BiomeSampler;
use crate::chunk::{calc_cell_index, calc_cell_pos, TerrainGrid, CHUNK_AREA, CHUNK_WIDTH};
use crate::node::NodeBlueprint;
use crate::noise::NoiseField;
use crate::rand::{chunk_seed, GameRand};
use crate::template::{NodeQuality, SpawnTemplate, TemplateSet};


/// Tunables for node generation.
#[derive(Debug, Clone, Copy)]
pub struct GenConfig {
    /// Maximum number of nodes in one chunk. Clamped to at least 32.
    pub resource_cap: usize,
    /// Chebyshev radius of cluster expansion around the seed cell.
    pub cluster_radius: i32,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            resource_cap: 64,
            cluster_radius: 3,
        }
    }
}

impl GenConfig {

    /// Clamp the tunables into their supported ranges.
    pub fn clamped(self) -> Self {
        Self {
            resource_cap: self.resource_cap.max(32),
            cluster_radius: self.cluster_radius.clamp(1, CHUNK_WIDTH as i32),
        }
    }

}


/// One template with its dedicated noise channel, seeded from the world
/// seed XOR the template id so distinct templates never alias.
struct TemplateChannel {
    template: SpawnTemplate,
    noise: NoiseField,
}


/// Deterministic resource node generator for one world.
pub struct NodeGenerator {
    world_seed: i64,
    cfg: GenConfig,
    channels: Vec<TemplateChannel>,
    biomes: BiomeSampler,
}

impl NodeGenerator {

    pub fn new(world_seed: i64, templates: &TemplateSet, cfg: GenConfig) -> Self {
        let channels = templates
            .iter()
            .map(|template| TemplateChannel {
                noise: NoiseField::from_seed(world_seed ^ template.id as i64),
                template: template.clone(),
            })
            .collect();
        Self {
            world_seed,
            cfg: cfg.clamped(),
            channels,
            biomes: BiomeSampler::new(world_seed),
        }
    }

    /// Generate the node layout of one chunk: a pure function of the world
    /// seed, the chunk coordinates, the terrain and the template set.
    pub fn generate(&self, cx: i32, cy: i32, terrain: &TerrainGrid) -> Vec<NodeBlueprint> {
        let mut occupied = [false; CHUNK_AREA];
        let mut out = Vec::new();
        let mut next_cluster = 0u16;
        for channel in &self.channels {
            if out.len() >= self.cfg.resource_cap {
                break;
            }
            self.generate_channel(channel, cx, cy, terrain, &mut occupied, &mut out, &mut next_cluster);
        }
        out
    }

    fn generate_channel(
        &self,
        channel: &TemplateChannel,
        cx: i32,
        cy: i32,
        terrain: &TerrainGrid,
        occupied: &mut [bool; CHUNK_AREA],
        out: &mut Vec<NodeBlueprint>,
        next_cluster: &mut u16,
    ) {

        let template = &channel.template;

        // Evaluate the candidate predicate over every cell once; cluster
        // expansion reuses it.
        let mut values = [0.0f64; CHUNK_AREA];
        let mut candidate = [false; CHUNK_AREA];
        for local_y in 0..CHUNK_WIDTH {
            for local_x in 0..CHUNK_WIDTH {
                let index = calc_cell_index(local_x, local_y);
                let (x, y) = calc_cell_pos(cx, cy, local_x, local_y);
                values[index] = channel.noise.terrain_sample(x, y, template.noise_scale);
                candidate[index] =
                    self.is_candidate(channel, terrain, local_x, local_y, x, y, values[index]);
            }
        }

        // Cluster seeds are the candidates ordered by descending noise
        // value; ties resolve on the row-major cell index.
        let mut seeds: Vec<usize> = (0..CHUNK_AREA).filter(|&index| candidate[index]).collect();
        seeds.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));

        let mut rand = GameRand::new(chunk_seed(self.world_seed, cx, cy, template.id as i64));

        for seed_index in seeds {

            if out.len() >= self.cfg.resource_cap {
                break;
            }
            if occupied[seed_index] {
                continue;
            }

            let want = rand
                .next_int_range(template.min_cluster as i32, template.max_cluster as i32)
                as usize;
            let cluster = *next_cluster;
            *next_cluster += 1;

            occupied[seed_index] = true;
            let mut members = vec![seed_index];

            // Grow the cluster, stopping early when no valid expansion
            // remains or the chunk cap is reached.
            while members.len() < want && out.len() + members.len() < self.cfg.resource_cap {
                match self.pick_expansion(seed_index, &candidate, occupied, &mut rand) {
                    Some(index) => {
                        occupied[index] = true;
                        members.push(index);
                    }
                    None => break,
                }
            }

            let size = members.len() as u8;
            for index in members {
                let quality = NodeQuality::roll(&mut rand);
                let base = rand
                    .next_int_range(template.min_yield as i32, template.max_yield as i32)
                    as u32;
                let initial_yield = ((base as f64 * quality.multiplier()).round() as u32).max(1);
                out.push(NodeBlueprint {
                    local_x: (index % CHUNK_WIDTH) as u8,
                    local_y: (index / CHUNK_WIDTH) as u8,
                    kind: template.kind,
                    quality,
                    cluster,
                    size,
                    initial_yield,
                    regeneration_rate: template.regeneration_rate,
                    behavior: template.behavior,
                });
            }

        }

    }

    fn is_candidate(
        &self,
        channel: &TemplateChannel,
        terrain: &TerrainGrid,
        local_x: usize,
        local_y: usize,
        x: i32,
        y: i32,
        value: f64,
    ) -> bool {

        let template = &channel.template;

        if value <= template.rarity {
            return false;
        }
        if !template.compatible.contains(terrain.get(local_x, local_y)) {
            return false;
        }

        // One-cell buffer from terrain transitions: every in-grid 4-neighbor
        // must be compatible too. Cells beyond the border are not consulted.
        let (local_x, local_y) = (local_x as i32, local_y as i32);
        let neighbors = [
            (local_x - 1, local_y),
            (local_x + 1, local_y),
            (local_x, local_y - 1),
            (local_x, local_y + 1),
        ];
        for (nx, ny) in neighbors {
            if nx < 0 || ny < 0 || nx >= CHUNK_WIDTH as i32 || ny >= CHUNK_WIDTH as i32 {
                continue;
            }
            if !template.compatible.contains(terrain.get(nx as usize, ny as usize)) {
                return false;
            }
        }

        if let Some(biomes) = &template.biomes {
            if !biomes.contains(&self.biomes.biome_at(x, y)) {
                return false;
            }
        }

        true

    }

    /// Pick the next cluster member among the unoccupied candidate cells
    /// within the cluster radius of the seed cell.
    fn pick_expansion(
        &self,
        seed_index: usize,
        candidate: &[bool; CHUNK_AREA],
        occupied: &[bool; CHUNK_AREA],
        rand: &mut GameRand,
    ) -> Option<usize> {

        let seed_x = (seed_index % CHUNK_WIDTH) as i32;
        let seed_y = (seed_index / CHUNK_WIDTH) as i32;
        let radius = self.cfg.cluster_radius;

        let mut options = Vec::new();
        for ny in (seed_y - radius)..=(seed_y + radius) {
            for nx in (seed_x - radius)..=(seed_x + radius) {
                if nx < 0 || ny < 0 || nx >= CHUNK_WIDTH as i32 || ny >= CHUNK_WIDTH as i32 {
                    continue;
                }
                let index = calc_cell_index(nx as usize, ny as usize);
                if candidate[index] && !occupied[index] {
                    options.push(index);
                }
            }
        }

        if options.is_empty() {
            None
        } else {
            Some(rand.next_choice(&options))
        }

    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::biome::Biome;
    use crate::gen::generate_terrain;
    use crate::template::{default_templates, ResourceKind, SpawnBehavior, SpawnTemplate};
    use crate::terrain::{TerrainKind, TerrainSet, TerrainShaper};

    fn grass_template(rarity: f64) -> SpawnTemplate {
        SpawnTemplate {
            id: 10,
            kind: ResourceKind::Herb,
            compatible: TerrainSet::of(&[TerrainKind::Grass]),
            rarity,
            noise_scale: 12.0,
            behavior: SpawnBehavior::Random,
            min_cluster: 1,
            max_cluster: 4,
            min_yield: 5,
            max_yield: 10,
            regeneration_rate: 2,
            respawn_delay_secs: 60,
            biomes: None,
        }
    }

    fn generator(world_seed: i64, templates: Vec<SpawnTemplate>) -> NodeGenerator {
        let set = TemplateSet::new(templates).unwrap();
        NodeGenerator::new(world_seed, &set, GenConfig::default())
    }

    #[test]
    fn layout_is_reproducible() {
        let terrain = generate_terrain(&TerrainShaper::new(12345), 2, -5);
        let a = generator(12345, default_templates()).generate(2, -5, &terrain);
        let b = generator(12345, default_templates()).generate(2, -5, &terrain);
        assert_eq!(a, b);
    }

    #[test]
    fn incompatible_terrain_spawns_nothing() {
        // A grass-only template over a grassless chunk produces zero nodes.
        let terrain = TerrainGrid::new_filled(TerrainKind::Water);
        let nodes = generator(1, vec![grass_template(-2.0)]).generate(0, 0, &terrain);
        assert!(nodes.is_empty());
    }

    #[test]
    fn saturated_grid_respects_the_cap() {
        let terrain = TerrainGrid::new_filled(TerrainKind::Grass);
        // Rarity below any possible sample makes every cell a candidate.
        let nodes = generator(99, vec![grass_template(-2.0)]).generate(0, 0, &terrain);
        assert!(!nodes.is_empty());
        assert!(nodes.len() <= GenConfig::default().resource_cap);

        // No two nodes share a cell and every cell is inside the chunk.
        let mut seen = std::collections::HashSet::new();
        for node in &nodes {
            assert!((node.local_x as usize) < CHUNK_WIDTH);
            assert!((node.local_y as usize) < CHUNK_WIDTH);
            assert!(seen.insert((node.local_x, node.local_y)));
        }
    }

    #[test]
    fn yields_follow_the_template_range() {
        let terrain = TerrainGrid::new_filled(TerrainKind::Grass);
        let template = grass_template(-2.0);
        let nodes = generator(7, vec![template.clone()]).generate(0, 0, &terrain);
        let ceiling = (template.max_yield as f64 * 1.5).round() as u32;
        for node in &nodes {
            assert!(node.initial_yield >= template.min_yield);
            assert!(node.initial_yield <= ceiling);
            assert!(node.size >= 1 && node.size <= template.max_cluster);
        }
    }

    #[test]
    fn transition_buffer_keeps_nodes_off_borders() {
        let mut terrain = TerrainGrid::new_filled(TerrainKind::Grass);
        terrain.set(10, 10, TerrainKind::Stone);
        let nodes = generator(3, vec![grass_template(-2.0)]).generate(0, 0, &terrain);
        assert!(!nodes.is_empty());
        for node in &nodes {
            let pos = (node.local_x, node.local_y);
            // Neither the incompatible cell nor its 4-neighbors hold nodes.
            assert_ne!(pos, (10, 10));
            assert_ne!(pos, (9, 10));
            assert_ne!(pos, (11, 10));
            assert_ne!(pos, (10, 9));
            assert_ne!(pos, (10, 11));
        }
    }

    #[test]
    fn all_biomes_restriction_matches_unrestricted() {
        let terrain = generate_terrain(&TerrainShaper::new(4242), 0, 0);
        let unrestricted = grass_template(-0.2);
        let mut restricted = unrestricted.clone();
        restricted.biomes = Some(vec![Biome::Coast, Biome::Plains, Biome::Forest, Biome::Hills]);

        let a = generator(4242, vec![unrestricted]).generate(0, 0, &terrain);
        let b = generator(4242, vec![restricted]).generate(0, 0, &terrain);
        assert_eq!(a, b);
    }

    #[test]
    fn config_clamps_to_supported_ranges() {
        let cfg = GenConfig { resource_cap: 4, cluster_radius: 0 }.clamped();
        assert_eq!(cfg.resource_cap, 32);
        assert_eq!(cfg.cluster_radius, 1);
    }

}
