//! Server configuration, read from a TOML file named by the `VELDT_CONFIG`
//! environment variable. Every key has a default, so a missing file yields
//! a working deployment.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use once_cell::sync::Lazy;
use serde::Deserialize;

use veldt::engine::EngineConfig;
use veldt::error::Error;
use veldt::gen::GenConfig;
use veldt::template::{SpawnTemplate, TemplateSet};
use veldt::tick::TickConfig;


/// Path of the configuration file, resolved once.
pub fn config_path() -> &'static Path {
    static PATH: Lazy<PathBuf> = Lazy::new(|| {
        env::var_os("VELDT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("veldt.toml"))
    });
    &PATH
}


#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the store file.
    pub data_dir: PathBuf,
    /// Radius of chunks pre-generated around the origin at startup; set to
    /// a negative value to skip the warmup.
    pub warmup_radius: i32,
    pub world: WorldSection,
    pub engine: EngineSection,
    pub sweep: SweepSection,
    /// Replaces the built-in spawn table when present.
    pub template: Option<Vec<SpawnTemplate>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            warmup_radius: 2,
            world: WorldSection::default(),
            engine: EngineSection::default(),
            sweep: SweepSection::default(),
            template: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldSection {
    /// Name of the default world, created on first boot.
    pub name: String,
    /// Seed of the default world; only used when creating it.
    pub seed: i64,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            name: "main".to_owned(),
            seed: 9999,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    pub worker_pool_cap: usize,
    pub resource_cap_per_chunk: usize,
    pub cluster_radius: i32,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            worker_pool_cap: 4,
            resource_cap_per_chunk: 64,
            cluster_radius: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepSection {
    pub regen_period_secs: u64,
    pub respawn_check_period_secs: u64,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            regen_period_secs: 3600,
            respawn_check_period_secs: 3600,
        }
    }
}

impl Config {

    /// Load the configuration file, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(ConfigError::Io(err)),
        };
        Ok(toml::from_str(&text)?)
    }

    /// The validated spawn template set: the configured table, or the
    /// built-in defaults.
    pub fn templates(&self) -> Result<TemplateSet, Error> {
        match &self.template {
            Some(templates) => TemplateSet::new(templates.clone()),
            None => Ok(TemplateSet::defaults()),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            worker_cap: self.engine.worker_pool_cap,
        }
    }

    pub fn gen_config(&self) -> GenConfig {
        GenConfig {
            resource_cap: self.engine.resource_cap_per_chunk,
            cluster_radius: self.engine.cluster_radius,
        }
    }

    pub fn tick_config(&self) -> TickConfig {
        TickConfig {
            regen_period: Duration::from_secs(self.sweep.regen_period_secs.max(1)),
            respawn_check_period: Duration::from_secs(self.sweep.respawn_check_period_secs.max(1)),
        }
    }

}


#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("parse: {0}")]
    Parse(#[from] toml::de::Error),
}
