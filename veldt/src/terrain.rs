//! Terrain classification over the world noise field.

use serde::{Deserialize, Serialize};

use crate::noise::NoiseField;


/// Scale of the broad terrain shape channel.
const PRIMARY_SCALE: f64 = 100.0;
/// Scale of the local detail channel.
const DETAIL_SCALE: f64 = 20.0;
/// Blend weights of the two channels.
const PRIMARY_WEIGHT: f64 = 0.7;
const DETAIL_WEIGHT: f64 = 0.3;


/// The terrain class carried by every world cell.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainKind {
    Water = 0,
    Sand = 1,
    Grass = 2,
    Dirt = 3,
    Stone = 4,
}

impl TerrainKind {

    pub const ALL: [TerrainKind; 5] = [
        TerrainKind::Water,
        TerrainKind::Sand,
        TerrainKind::Grass,
        TerrainKind::Dirt,
        TerrainKind::Stone,
    ];

    /// Decode a raw cell byte as stored in chunk blobs.
    #[inline]
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => TerrainKind::Water,
            1 => TerrainKind::Sand,
            2 => TerrainKind::Grass,
            3 => TerrainKind::Dirt,
            4 => TerrainKind::Stone,
            _ => return None,
        })
    }

    /// Raw cell byte as stored in chunk blobs.
    #[inline]
    pub fn raw(self) -> u8 {
        self as u8
    }

    /// Water and stone cannot be walked on; everything else can.
    #[inline]
    pub fn is_walkable(self) -> bool {
        !matches!(self, TerrainKind::Water | TerrainKind::Stone)
    }

}


/// A set of terrain classes stored as a bit mask, used by spawn templates
/// to express terrain compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainSet(u8);

impl TerrainSet {

    pub const EMPTY: TerrainSet = TerrainSet(0);

    /// Build a set from the given kinds.
    pub const fn of(kinds: &[TerrainKind]) -> Self {
        let mut mask = 0u8;
        let mut i = 0;
        while i < kinds.len() {
            mask |= 1 << kinds[i] as u8;
            i += 1;
        }
        TerrainSet(mask)
    }

    #[inline]
    pub fn contains(self, kind: TerrainKind) -> bool {
        self.0 & (1 << kind.raw()) != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Kinds present in the set, in declaration order.
    pub fn iter(self) -> impl Iterator<Item = TerrainKind> {
        TerrainKind::ALL.into_iter().filter(move |&kind| self.contains(kind))
    }

}

// Serialized as the list of kinds so configuration files stay readable.
impl Serialize for TerrainSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for TerrainSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kinds = Vec::<TerrainKind>::deserialize(deserializer)?;
        Ok(TerrainSet::of(&kinds))
    }
}


/// Map a combined noise sample to its terrain bucket. The comparison is
/// strictly `<` on each upper bound, so boundary values resolve to the
/// higher bucket.
pub fn classify_combined(combined: f64) -> TerrainKind {
    if combined < -0.3 {
        TerrainKind::Water
    } else if combined < -0.1 {
        TerrainKind::Sand
    } else if combined < 0.2 {
        TerrainKind::Grass
    } else if combined < 0.5 {
        TerrainKind::Dirt
    } else {
        TerrainKind::Stone
    }
}


/// Classifies world cells into terrain, constructed once per world from the
/// world seed.
#[derive(Debug, Clone)]
pub struct TerrainShaper {
    noise: NoiseField,
}

impl TerrainShaper {

    pub fn new(world_seed: i64) -> Self {
        Self { noise: NoiseField::from_seed(world_seed) }
    }

    /// The blended two-channel sample driving classification.
    pub fn combined_sample(&self, x: i32, y: i32) -> f64 {
        PRIMARY_WEIGHT * self.noise.terrain_sample(x, y, PRIMARY_SCALE)
            + DETAIL_WEIGHT * self.noise.terrain_sample(x, y, DETAIL_SCALE)
    }

    /// Terrain class of the world cell at the given coordinates.
    pub fn classify(&self, x: i32, y: i32) -> TerrainKind {
        classify_combined(self.combined_sample(x, y))
    }

}
