use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use proctor_core::EngineConfig;

use super::types::{
    DEFAULT_HOST, DEFAULT_PORT, ProctorConfig, RawProctorConfig, RawServerConfig,
    RawStorageConfig, ServerConfigSection, StorageConfigSection,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project) with an optional explicit
    /// file on top
    ///
    /// Unlike the user and project layers, an explicit file must exist.
    pub fn load_with(extra: Option<&Path>) -> Result<ProctorConfig> {
        let mut raw = RawProctorConfig::default();

        // Layer 1: User config
        let user_path = Self::user_config_path();
        if user_path.exists() {
            raw = Self::merge_raw(raw, Self::load_from_path(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::load_from_path(&project_path)?);
        }

        // Layer 3: --config
        if let Some(path) = extra {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            raw = Self::merge_raw(raw, Self::load_from_path(path)?);
        }

        Self::finalize(raw)
    }

    /// Get user config path
    pub fn user_config_path() -> PathBuf {
        proctor_paths::config_file()
    }

    /// Get project config path
    /// Can be overridden with PROCTOR_PROJECT_CONFIG_DIR env var (useful for isolated e2e tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("PROCTOR_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".proctor/config.toml")
        }
    }

    /// Parse one config file without applying defaults
    pub fn load_from_path(path: &Path) -> Result<RawProctorConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawProctorConfig, overlay: RawProctorConfig) -> RawProctorConfig {
        let engine = match (base.engine, overlay.engine) {
            (Some(mut base), Some(overlay)) => {
                merge_tables(&mut base, overlay);
                Some(base)
            }
            (base, overlay) => overlay.or(base),
        };

        RawProctorConfig {
            server: RawServerConfig {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
            },
            storage: RawStorageConfig {
                database: overlay.storage.database.or(base.storage.database),
                evidence_dir: overlay.storage.evidence_dir.or(base.storage.evidence_dir),
                memory: overlay.storage.memory.or(base.storage.memory),
            },
            engine,
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawProctorConfig) -> Result<ProctorConfig> {
        let storage_defaults = StorageConfigSection::default();

        let engine: EngineConfig = match raw.engine {
            Some(table) => toml::Value::Table(table)
                .try_into::<EngineConfig>()
                .context("invalid [engine] section")?,
            None => EngineConfig::default(),
        };
        engine.validate()?;

        Ok(ProctorConfig {
            server: ServerConfigSection {
                host: raw.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: raw.server.port.unwrap_or(DEFAULT_PORT),
            },
            storage: StorageConfigSection {
                database: raw.storage.database.unwrap_or(storage_defaults.database),
                evidence_dir: raw
                    .storage
                    .evidence_dir
                    .unwrap_or(storage_defaults.evidence_dir),
                memory: raw.storage.memory.unwrap_or(false),
            },
            engine,
        })
    }
}

/// Recursively merge `overlay` into `base`; overlay wins on conflicts
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(overlay_table) = value {
            if let Some(toml::Value::Table(base_table)) = base.get_mut(&key) {
                merge_tables(base_table, overlay_table);
                continue;
            }
            base.insert(key, toml::Value::Table(overlay_table));
        } else {
            base.insert(key, value);
        }
    }
}
