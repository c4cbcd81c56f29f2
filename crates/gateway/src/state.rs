use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use tokio::sync::{RwLock, mpsc};

use crate::{auth::ResolvedAuth, rooms::RoomRegistry};

// ── Connected client ─────────────────────────────────────────────────────────

/// A WebSocket client currently connected to the gateway.
#[derive(Debug)]
pub struct ConnectedClient {
    pub conn_id: String,
    pub remote_addr: Option<SocketAddr>,
    /// Channel for sending serialized frames to this client's write loop.
    pub sender: mpsc::UnboundedSender<String>,
    pub connected_at: Instant,
}

impl ConnectedClient {
    pub fn new(
        conn_id: impl Into<String>,
        remote_addr: Option<SocketAddr>,
        sender: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            conn_id: conn_id.into(),
            remote_addr,
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Queue a serialized frame. Returns false if the write loop is gone.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, owned by the server for its whole lifetime.
pub struct GatewayState {
    /// All connected WebSocket clients, keyed by conn_id.
    pub clients: RwLock<HashMap<String, ConnectedClient>>,
    /// Consultation rooms.
    pub rooms: RwLock<RoomRegistry>,
    /// Monotonically increasing sequence counter for outbound frames.
    pub seq: AtomicU64,
    /// Server version string.
    pub version: String,
    pub hostname: String,
    pub auth: ResolvedAuth,
}

impl GatewayState {
    pub fn new(auth: ResolvedAuth) -> Arc<Self> {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".into());

        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            rooms: RwLock::new(RoomRegistry::new()),
            seq: AtomicU64::new(0),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname,
            auth,
        })
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register a new client connection.
    pub async fn register_client(&self, client: ConnectedClient) {
        let conn_id = client.conn_id.clone();
        self.clients.write().await.insert(conn_id, client);
    }

    /// Remove a client and its room membership. Returns the removed client.
    pub async fn remove_client(&self, conn_id: &str) -> Option<ConnectedClient> {
        self.rooms.write().await.leave(conn_id);
        self.clients.write().await.remove(conn_id)
    }

    /// Number of connected clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Number of non-empty rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.room_count()
    }
}
