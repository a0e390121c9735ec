//! Conversation room management for pub/sub
//!
//! Each conversation is a "room"; every subscribed connection receives the
//! events broadcast into it.

use redeemdesk_shared::ServerEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;

/// Manages conversation rooms for broadcasting events
pub struct RoomManager {
    /// Map of conversation_id -> list of connections
    rooms: Arc<RwLock<HashMap<Uuid, Vec<Arc<Connection>>>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a connection to a conversation room.
    ///
    /// Joining twice is a no-op so a resubscribe after reconnect does not
    /// deliver each event twice.
    pub async fn join(&self, conversation_id: Uuid, conn: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(conversation_id).or_default();
        if !members.iter().any(|c| c.session_id == conn.session_id) {
            members.push(Arc::clone(&conn));
        }

        tracing::debug!(
            conversation_id = %conversation_id,
            session_id = %conn.session_id,
            room_size = members.len(),
            "Connection joined conversation room"
        );
    }

    /// Remove a connection from a conversation room
    pub async fn leave(&self, conversation_id: &Uuid, session_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(conns) = rooms.get_mut(conversation_id) {
            conns.retain(|c| c.session_id != *session_id);

            if conns.is_empty() {
                rooms.remove(conversation_id);
                tracing::debug!(conversation_id = %conversation_id, "Removed empty conversation room");
            }
        }
    }

    /// Broadcast an event to all connections in a conversation room
    ///
    /// Send errors are ignored; closed connections are cleaned up on disconnect.
    pub async fn broadcast(&self, conversation_id: &Uuid, event: ServerEvent) -> usize {
        let rooms = self.rooms.read().await;
        let Some(conns) = rooms.get(conversation_id) else {
            tracing::debug!(
                conversation_id = %conversation_id,
                "No subscribers for conversation"
            );
            return 0;
        };

        let mut delivered = 0;
        for conn in conns {
            match conn.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!(
                        session_id = %conn.session_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            conversation_id = %conversation_id,
            recipients = delivered,
            failed = conns.len() - delivered,
            "Broadcast event to conversation room"
        );

        delivered
    }

    /// Remove a connection from all rooms
    pub async fn remove_connection(&self, session_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        for conns in rooms.values_mut() {
            conns.retain(|c| c.session_id != *session_id);
        }
        rooms.retain(|_, conns| !conns.is_empty());
    }

    pub async fn get_room_size(&self, conversation_id: &Uuid) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(conversation_id).map(|v| v.len()).unwrap_or(0)
    }

    pub async fn get_room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Principal;
    use tokio::sync::mpsc;

    fn customer_conn() -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Connection::new(Principal::Customer("c1".into()), tx)),
            rx,
        )
    }

    #[tokio::test]
    async fn test_room_join_and_leave() {
        let room_manager = RoomManager::new();
        let conversation_id = Uuid::new_v4();
        let (conn, _rx) = customer_conn();

        assert_eq!(room_manager.get_room_size(&conversation_id).await, 0);

        room_manager.join(conversation_id, Arc::clone(&conn)).await;
        assert_eq!(room_manager.get_room_size(&conversation_id).await, 1);

        room_manager.leave(&conversation_id, &conn.session_id).await;
        assert_eq!(room_manager.get_room_size(&conversation_id).await, 0);
        assert_eq!(room_manager.get_room_count().await, 0);
    }

    #[tokio::test]
    async fn test_double_join_delivers_once() {
        let room_manager = RoomManager::new();
        let conversation_id = Uuid::new_v4();
        let (conn, mut rx) = customer_conn();

        room_manager.join(conversation_id, Arc::clone(&conn)).await;
        room_manager.join(conversation_id, Arc::clone(&conn)).await;

        assert_eq!(
            room_manager
                .broadcast(&conversation_id, ServerEvent::Pong)
                .await,
            1
        );
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_room() {
        let room_manager = RoomManager::new();
        let conversation_id = Uuid::new_v4();
        let (conn1, mut rx1) = customer_conn();
        let (conn2, mut rx2) = customer_conn();

        room_manager.join(conversation_id, conn1).await;
        room_manager.join(conversation_id, conn2).await;

        room_manager
            .broadcast(&conversation_id, ServerEvent::Pong)
            .await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_without_room() {
        let room_manager = RoomManager::new();
        assert_eq!(
            room_manager
                .broadcast(&Uuid::new_v4(), ServerEvent::Pong)
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_remove_connection_from_all_rooms() {
        let room_manager = RoomManager::new();
        let (conn, _rx) = customer_conn();

        room_manager.join(Uuid::new_v4(), Arc::clone(&conn)).await;
        room_manager.join(Uuid::new_v4(), Arc::clone(&conn)).await;
        assert_eq!(room_manager.get_room_count().await, 2);

        room_manager.remove_connection(&conn.session_id).await;
        assert_eq!(room_manager.get_room_count().await, 0);
    }
}
