//! Shared realtime state: live connections and conversation rooms

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::room::RoomManager;

#[derive(Clone)]
pub struct WebSocketState {
    /// Live connections by session id
    pub connections: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,

    /// Conversation rooms used for broadcasts
    pub rooms: Arc<RoomManager>,
}

impl WebSocketState {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomManager::new()),
        }
    }

    /// Register a connection and hand back the shared handle
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let total = {
            let mut connections = self.connections.write().await;
            connections.insert(conn.session_id, Arc::clone(&conn));
            connections.len()
        };

        tracing::info!(
            session_id = %conn.session_id,
            admin = conn.principal.is_admin(),
            total_connections = total,
            "WebSocket connection added"
        );

        conn
    }

    /// Forget a connection and drop it from every room it joined
    pub async fn remove_connection(&self, session_id: &Uuid) {
        let removed = self.connections.write().await.remove(session_id);
        if removed.is_none() {
            return;
        }

        self.rooms.remove_connection(session_id).await;
        let remaining_connections = self.connection_count().await;
        tracing::info!(
            session_id = %session_id,
            remaining_connections = remaining_connections,
            "WebSocket connection removed"
        );
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Connection and room counters for the health endpoint
    pub async fn get_stats(&self) -> WebSocketStats {
        let (admins, customers) = {
            let connections = self.connections.read().await;
            let admins = connections
                .values()
                .filter(|conn| conn.principal.is_admin())
                .count();
            (admins, connections.len() - admins)
        };

        WebSocketStats {
            active_connections: admins + customers,
            admin_connections: admins,
            customer_connections: customers,
            active_rooms: self.rooms.get_room_count().await,
        }
    }
}

impl Default for WebSocketState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WebSocketStats {
    pub active_connections: usize,
    pub admin_connections: usize,
    pub customer_connections: usize,
    /// Conversations with at least one subscriber
    pub active_rooms: usize,
}
