//! QueuedMessage / BroadcastMessage - payload che attraversano broker e bus

use super::message::ChatMessage;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Quello che attraversa il broker: il messaggio del client più il `roomId`
/// (duplicato per indipendenza di partizione) e il timestamp di ingresso.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub chat_message: ChatMessage,
    pub room_id: i32,
    /// Epoch ms di ingresso sull'edge.
    pub received_timestamp: i64,
}

impl QueuedMessage {
    pub fn new(chat_message: ChatMessage, room_id: i32) -> Self {
        Self {
            chat_message,
            room_id,
            received_timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Quello che attraversa il bus: denormalizzato per una consegna veloce.
/// Non viene mai persistito.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    pub user_id: i32,
    pub username: String,
    pub message: String,
    pub client_timestamp: String,
    pub message_type: String,
    pub room_id: i32,
    /// Epoch ms di processamento nel consumer.
    pub server_timestamp: i64,
}

impl BroadcastMessage {
    pub fn from_queued(queued: &QueuedMessage, server_timestamp: i64) -> Self {
        let msg = &queued.chat_message;
        Self {
            user_id: msg.user_id,
            username: msg.username.clone(),
            message: msg.message.clone(),
            client_timestamp: msg.timestamp.clone(),
            message_type: msg.message_type.clone(),
            room_id: queued.room_id,
            server_timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat() -> ChatMessage {
        ChatMessage {
            user_id: 42,
            username: "alice1".to_string(),
            message: "hello".to_string(),
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            message_type: "TEXT".to_string(),
            room_id: 3,
        }
    }

    #[test]
    fn test_queued_wire_shape() {
        let queued = QueuedMessage::new(chat(), 3);
        let json = serde_json::to_string(&queued).unwrap();
        assert!(json.contains("\"chatMessage\""));
        assert!(json.contains("\"roomId\":3"));
        assert!(json.contains("\"receivedTimestamp\""));

        let back: QueuedMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.chat_message.user_id, 42);
        assert_eq!(back.room_id, 3);
    }

    #[test]
    fn test_broadcast_carries_presentation_fields() {
        let queued = QueuedMessage::new(chat(), 3);
        let broadcast = BroadcastMessage::from_queued(&queued, 1_700_000_000_000);

        assert_eq!(broadcast.user_id, 42);
        assert_eq!(broadcast.client_timestamp, "2025-01-01T00:00:00Z");
        assert_eq!(broadcast.server_timestamp, 1_700_000_000_000);

        let json = serde_json::to_string(&broadcast).unwrap();
        assert!(json.contains("\"clientTimestamp\""));
        assert!(json.contains("\"serverTimestamp\""));
        // mai campi di stato: il broadcast non è una risposta
        assert!(!json.contains("\"status\""));
    }
}
