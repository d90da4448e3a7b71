//! Resource spawn templates: the configuration records driving how each
//! resource type spawns, plus the built-in default table used when a
//! deployment does not override it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::biome::Biome;
use crate::error::Error;
use crate::rand::GameRand;
use crate::terrain::{TerrainKind, TerrainSet};


/// Resource types the engine knows how to spawn and harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Herb,
    Berry,
    Pearl,
    Flint,
}

impl ResourceKind {

    /// Inventory item id credited on harvest.
    #[inline]
    pub fn item_id(self) -> u32 {
        match self {
            ResourceKind::Herb => 1,
            ResourceKind::Berry => 2,
            ResourceKind::Pearl => 3,
            ResourceKind::Flint => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Herb => "herb",
            ResourceKind::Berry => "berry",
            ResourceKind::Pearl => "pearl",
            ResourceKind::Flint => "flint",
        }
    }

}


/// The canonical spawn behavior axis. Resource types reference one of these;
/// the engine stores the behavior on every node it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnBehavior {
    Random,
    StaticDaily,
    StaticPermanent,
}


/// Quality tier rolled for each spawned node, scaling its yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeQuality {
    Common,
    Fine,
    Pristine,
}

impl NodeQuality {

    /// Yield multiplier of this tier.
    #[inline]
    pub fn multiplier(self) -> f64 {
        match self {
            NodeQuality::Common => 1.0,
            NodeQuality::Fine => 1.25,
            NodeQuality::Pristine => 1.5,
        }
    }

    /// Weighted roll: 70% common, 25% fine, 5% pristine.
    pub fn roll(rand: &mut GameRand) -> Self {
        let value = rand.next_int_bounded(100);
        if value < 70 {
            NodeQuality::Common
        } else if value < 95 {
            NodeQuality::Fine
        } else {
            NodeQuality::Pristine
        }
    }

}


/// Configuration record driving how one resource type spawns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnTemplate {
    /// Stable identifier; also salts this template's noise channel so
    /// distinct templates never alias.
    pub id: u32,
    pub kind: ResourceKind,
    /// Terrain classes this resource may spawn on.
    pub compatible: TerrainSet,
    /// Noise threshold a cell must strictly exceed to become a candidate.
    pub rarity: f64,
    /// Scale of the template's noise channel.
    pub noise_scale: f64,
    pub behavior: SpawnBehavior,
    /// Cluster size range, inclusive.
    pub min_cluster: u8,
    pub max_cluster: u8,
    /// Yield range, inclusive, before the quality multiplier.
    pub min_yield: u32,
    pub max_yield: u32,
    /// Yield restored per regeneration sweep.
    pub regeneration_rate: u32,
    /// Seconds between depletion and respawn eligibility.
    pub respawn_delay_secs: u64,
    /// When set, nodes only spawn on cells within these biomes.
    #[serde(default)]
    pub biomes: Option<Vec<Biome>>,
}


/// Validated, insertion-ordered set of spawn templates. Iteration order is
/// part of the generation determinism contract.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: IndexMap<u32, SpawnTemplate>,
}

impl TemplateSet {

    /// Build a set, rejecting empty or internally inconsistent lists.
    pub fn new(templates: Vec<SpawnTemplate>) -> Result<Self, Error> {

        if templates.is_empty() {
            return Err(Error::InvalidArgument("empty spawn template set".into()));
        }

        let mut map = IndexMap::with_capacity(templates.len());
        for template in templates {
            validate_template(&template)?;
            if map.insert(template.id, template).is_some() {
                return Err(Error::InvalidArgument("duplicate spawn template id".into()));
            }
        }

        Ok(Self { templates: map })

    }

    /// The built-in spawn table.
    pub fn defaults() -> Self {
        Self::new(default_templates()).expect("built-in spawn table is valid")
    }

    pub fn get(&self, id: u32) -> Option<&SpawnTemplate> {
        self.templates.get(&id)
    }

    /// First template spawning the given resource kind.
    pub fn for_kind(&self, kind: ResourceKind) -> Option<&SpawnTemplate> {
        self.templates.values().find(|template| template.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpawnTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

}

fn validate_template(template: &SpawnTemplate) -> Result<(), Error> {
    let fail = |message: &str| {
        Err(Error::InvalidArgument(format!("template {}: {message}", template.id)))
    };
    if template.compatible.is_empty() {
        return fail("empty terrain compatibility set");
    }
    if template.min_cluster == 0 || template.min_cluster > template.max_cluster {
        return fail("invalid cluster size range");
    }
    if template.min_yield == 0 || template.min_yield > template.max_yield {
        return fail("invalid yield range");
    }
    if !(template.noise_scale > 0.0) {
        return fail("noise scale must be positive");
    }
    if !template.rarity.is_finite() {
        return fail("rarity must be finite");
    }
    if let Some(biomes) = &template.biomes {
        if biomes.is_empty() {
            return fail("empty biome restriction");
        }
    }
    Ok(())
}


/// The built-in spawn table used when the deployment does not override it.
pub fn default_templates() -> Vec<SpawnTemplate> {
    vec![
        SpawnTemplate {
            id: 1,
            kind: ResourceKind::Herb,
            compatible: TerrainSet::of(&[TerrainKind::Grass]),
            rarity: 0.30,
            noise_scale: 14.0,
            behavior: SpawnBehavior::Random,
            min_cluster: 1,
            max_cluster: 4,
            min_yield: 8,
            max_yield: 20,
            regeneration_rate: 4,
            respawn_delay_secs: 3600,
            biomes: None,
        },
        SpawnTemplate {
            id: 2,
            kind: ResourceKind::Berry,
            compatible: TerrainSet::of(&[TerrainKind::Grass, TerrainKind::Dirt]),
            rarity: 0.42,
            noise_scale: 22.0,
            behavior: SpawnBehavior::Random,
            min_cluster: 2,
            max_cluster: 5,
            min_yield: 5,
            max_yield: 12,
            regeneration_rate: 3,
            respawn_delay_secs: 7200,
            biomes: Some(vec![Biome::Plains, Biome::Forest]),
        },
        SpawnTemplate {
            id: 3,
            kind: ResourceKind::Pearl,
            compatible: TerrainSet::of(&[TerrainKind::Sand]),
            rarity: 0.55,
            noise_scale: 9.0,
            behavior: SpawnBehavior::StaticDaily,
            min_cluster: 1,
            max_cluster: 2,
            min_yield: 1,
            max_yield: 3,
            regeneration_rate: 1,
            respawn_delay_secs: 86_400,
            biomes: Some(vec![Biome::Coast]),
        },
        SpawnTemplate {
            id: 4,
            kind: ResourceKind::Flint,
            compatible: TerrainSet::of(&[TerrainKind::Dirt, TerrainKind::Stone]),
            rarity: 0.48,
            noise_scale: 17.0,
            behavior: SpawnBehavior::StaticPermanent,
            min_cluster: 1,
            max_cluster: 3,
            min_yield: 10,
            max_yield: 30,
            regeneration_rate: 5,
            respawn_delay_secs: 1800,
            biomes: None,
        },
    ]
}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn default_table_is_valid() {
        let set = TemplateSet::defaults();
        assert_eq!(set.len(), 4);
        assert!(set.get(1).is_some());
        assert_eq!(set.for_kind(ResourceKind::Pearl).map(|t| t.id), Some(3));
    }

    #[test]
    fn rejects_empty_set() {
        assert!(matches!(TemplateSet::new(Vec::new()), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn rejects_bad_ranges() {
        let mut bad = default_templates();
        bad[0].min_yield = 10;
        bad[0].max_yield = 5;
        assert!(matches!(TemplateSet::new(bad), Err(Error::InvalidArgument(_))));

        let mut bad = default_templates();
        bad[1].min_cluster = 0;
        assert!(TemplateSet::new(bad).is_err());

        let mut bad = default_templates();
        bad[2].compatible = TerrainSet::EMPTY;
        assert!(TemplateSet::new(bad).is_err());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut templates = default_templates();
        templates[1].id = templates[0].id;
        assert!(TemplateSet::new(templates).is_err());
    }

    #[test]
    fn quality_roll_is_deterministic() {
        let mut a = GameRand::new(5);
        let mut b = GameRand::new(5);
        for _ in 0..64 {
            assert_eq!(NodeQuality::roll(&mut a), NodeQuality::roll(&mut b));
        }
    }

}
