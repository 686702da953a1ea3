use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File};
use dirs_next::config_dir;
use serde::{Deserialize, Serialize};

use crate::providers::mal::MalConfig;
use crate::types::Translation;

pub const ENV_PREFIX: &str = "ANIMESRC";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub translation: Translation,
    pub probe_direct_sources: bool,
    pub log_filter: String,
    pub mal: MalConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            translation: Translation::Sub,
            probe_direct_sources: true,
            log_filter: String::from("warn"),
            mal: MalConfig::default(),
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file if present, then `ANIMESRC_*` variables.
    pub fn load(path: &Path) -> Result<Self> {
        let env = env_source().try_parsing(true);
        Self::load_with_env(path, env)
    }

    fn load_with_env(path: &Path, env: Environment) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("failed to read config {}", path.display()))?;
        settings
            .try_deserialize()
            .with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render settings")
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

pub fn config_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(base.join("animesrc").join("config.toml"))
}
