//! Proctor serve command
//!
//! Runs the proctor server which provides:
//! - WebSocket ingestion for exam browsers and the admin dashboard
//! - HTTP API for session management and metrics

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use proctor_core::{
    DEFAULT_HISTORY_LIMIT, FileEvidenceStore, MemoryEventBus, SessionRegistry, SqliteSessionStore,
};
use proctor_server::{ProctorServer, ServerConfig};
use tracing::info;

use crate::config::{ConfigLoader, ProctorConfig};

/// Broadcast capacity of the engine event bus
const EVENT_BUS_CAPACITY: usize = 1024;

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Extra config file layered on top of user and project config
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SQLite database for finished session records
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Directory for evidence snapshots
    #[arg(long)]
    pub evidence_dir: Option<PathBuf>,

    /// Keep sessions and evidence in memory only
    #[arg(long, conflicts_with_all = ["db", "evidence_dir"])]
    pub memory: bool,
}

impl ServeArgs {
    /// Command-line flags are the last config layer
    fn apply(&self, config: &mut ProctorConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(db) = &self.db {
            config.storage.database = db.clone();
        }
        if let Some(dir) = &self.evidence_dir {
            config.storage.evidence_dir = dir.clone();
        }
        if self.memory {
            config.storage.memory = true;
        }
    }
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = ConfigLoader::load_with(args.config.as_deref())?;
    args.apply(&mut config);

    let registry = build_registry(&config)?;
    let server_config = ServerConfig::new(config.server.host.clone(), config.server.port);

    info!(
        "Starting proctor server on {}:{}",
        server_config.host, server_config.port
    );

    let server = ProctorServer::new(server_config, Arc::new(registry));
    server.run().await.map_err(Into::into)
}

fn build_registry(config: &ProctorConfig) -> Result<SessionRegistry> {
    if config.storage.memory {
        info!("Using in-memory storage; records are lost on exit");
        return Ok(SessionRegistry::in_memory(config.engine.clone()));
    }

    let sessions = SqliteSessionStore::open(&config.storage.database).with_context(|| {
        format!(
            "failed to open session database {}",
            config.storage.database.display()
        )
    })?;
    let evidence = FileEvidenceStore::new(&config.storage.evidence_dir);
    info!(
        database = %config.storage.database.display(),
        evidence = %config.storage.evidence_dir.display(),
        "Using persistent storage"
    );

    Ok(SessionRegistry::new(
        config.engine.clone(),
        Arc::new(sessions),
        Arc::new(evidence),
        Arc::new(MemoryEventBus::with_history_limit(
            EVENT_BUS_CAPACITY,
            DEFAULT_HISTORY_LIMIT,
        )),
    ))
}
