//! Message entity - Record persistito e righe delle query analitiche

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Riga della tabella `messages`. L'identità è `(message_id, created_at)`:
/// `created_at` è la chiave di partizionamento, `server_timestamp` l'ordine
/// autoritativo di ingresso.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MessageRecord {
    pub message_id: Uuid,
    pub room_id: i32,
    pub user_id: i32,
    pub username: String,
    pub message_text: String,
    pub message_type: String,
    pub client_timestamp: DateTime<Utc>,
    pub server_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Partecipazione di un utente ad una stanza (conteggio + ultima attività).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RoomParticipation {
    pub room_id: i32,
    pub last_activity: DateTime<Utc>,
    pub message_count: i64,
}

/// Messaggi al minuto in una finestra temporale.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MessageRate {
    pub minute: DateTime<Utc>,
    pub message_count: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserStats {
    pub user_id: i32,
    pub username: String,
    pub message_count: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RoomStats {
    pub room_id: i32,
    pub message_count: i64,
    pub unique_users: i64,
}
