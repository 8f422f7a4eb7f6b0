//! Shared test utilities for proctor-server integration tests

pub mod client;

use std::net::SocketAddr;
use std::sync::Arc;

use proctor_core::{
    EngineConfig, EventBus, MemoryEventBus, MemoryStore, SessionRegistry,
};
use proctor_server::{AppState, ProctorServer, ServerConfig};
use tokio::net::TcpListener;

/// Handles kept by a test after the server is spawned
#[allow(dead_code)]
pub struct TestServer {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub addr: SocketAddr,
}

/// Creates a test server backed by in-memory stores
#[allow(dead_code)]
pub async fn create_test_server() -> TestServer {
    create_test_server_with_config(EngineConfig::default()).await
}

/// Creates a test server with a custom engine config
#[allow(dead_code)]
pub async fn create_test_server_with_config(config: EngineConfig) -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let bus: Arc<dyn EventBus> = Arc::new(MemoryEventBus::new(1024));
    let registry = Arc::new(SessionRegistry::new(
        config,
        store.clone(),
        store.clone(),
        bus,
    ));
    let state = Arc::new(AppState::new(registry));

    let server = ProctorServer::with_state(ServerConfig::default(), Arc::clone(&state));
    let addr = spawn_server(server).await;

    TestServer { state, store, addr }
}

/// Spawns server in background task, returns bound address
async fn spawn_server(server: ProctorServer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.run_with_listener(listener).await;
    });

    // Brief delay to ensure server is accepting connections
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    addr
}
