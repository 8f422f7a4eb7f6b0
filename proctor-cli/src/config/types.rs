use std::path::PathBuf;

use proctor_core::EngineConfig;
use serde::{Deserialize, Serialize};

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawProctorConfig {
    #[serde(default)]
    pub server: RawServerConfig,

    #[serde(default)]
    pub storage: RawStorageConfig,

    /// Engine settings stay untyped until every layer is merged, so a
    /// project file can override a single rule threshold
    #[serde(default)]
    pub engine: Option<toml::Table>,
}

/// Server config as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawStorageConfig {
    pub database: Option<PathBuf>,
    pub evidence_dir: Option<PathBuf>,
    pub memory: Option<bool>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProctorConfig {
    #[serde(default)]
    pub server: ServerConfigSection,

    #[serde(default)]
    pub storage: StorageConfigSection,

    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfigSection {
    /// Host address to bind to
    pub host: String,

    /// Port for the proctor server
    pub port: u16,
}

impl Default for ServerConfigSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfigSection {
    /// SQLite database holding finished session records
    pub database: PathBuf,

    /// Root directory for evidence snapshots
    pub evidence_dir: PathBuf,

    /// Keep everything in memory; nothing survives a restart
    pub memory: bool,
}

impl Default for StorageConfigSection {
    fn default() -> Self {
        Self {
            database: proctor_paths::database_path(),
            evidence_dir: proctor_paths::evidence_dir(),
            memory: false,
        }
    }
}

/// Default host for the proctor server
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port for the proctor server
pub const DEFAULT_PORT: u16 = 7433;
