//! MessageRepository - Persistenza batch e query analitiche
//!
//! Le scritture passano da un'unica INSERT con array UNNEST: una sola
//! istruzione preparata, una sola transazione, idempotente sul conflitto
//! di chiave `(message_id, created_at)`.

use super::traits::MessageStore;
use crate::dtos::QueuedMessage;
use crate::entities::{MessageRate, MessageRecord, RoomParticipation, RoomStats, UserStats};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, instrument};
use uuid::Uuid;

const INSERT_BATCH_SQL: &str = r#"
INSERT INTO messages
    (message_id, room_id, user_id, username, message_text,
     message_type, client_timestamp, server_timestamp, created_at)
SELECT * FROM UNNEST
    ($1::uuid[], $2::int4[], $3::int4[], $4::text[], $5::text[],
     $6::text[], $7::timestamptz[], $8::timestamptz[], $9::timestamptz[])
ON CONFLICT (message_id, created_at) DO NOTHING
"#;

pub struct MessageRepository {
    pool: PgPool,
    inserted: AtomicU64,
    failed: AtomicU64,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            inserted: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn inserted_count(&self) -> u64 {
        self.inserted.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Storico di una stanza in un intervallo, dal più recente.
    pub async fn messages_for_room(
        &self,
        room_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MessageRecord>, sqlx::Error> {
        sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT message_id, room_id, user_id, username, message_text,
                   message_type, client_timestamp, server_timestamp, created_at
            FROM messages
            WHERE room_id = $1 AND created_at BETWEEN $2 AND $3
            ORDER BY created_at DESC
            LIMIT 1000
            "#,
        )
        .bind(room_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
    }

    /// Storico di un utente in un intervallo.
    pub async fn user_message_history(
        &self,
        user_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MessageRecord>, sqlx::Error> {
        sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT message_id, room_id, user_id, username, message_text,
                   message_type, client_timestamp, server_timestamp, created_at
            FROM messages
            WHERE user_id = $1 AND created_at BETWEEN $2 AND $3
            ORDER BY created_at DESC
            LIMIT 10000
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
    }

    /// Utenti distinti attivi nella finestra.
    pub async fn count_active_users(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT user_id) FROM messages WHERE created_at BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
    }

    /// Stanze frequentate da un utente, con conteggio e ultima attività.
    pub async fn rooms_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<RoomParticipation>, sqlx::Error> {
        sqlx::query_as::<_, RoomParticipation>(
            r#"
            SELECT room_id, MAX(created_at) AS last_activity, COUNT(*) AS message_count
            FROM messages
            WHERE user_id = $1
            GROUP BY room_id
            ORDER BY last_activity DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Messaggi al minuto nella finestra.
    pub async fn messages_per_minute(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MessageRate>, sqlx::Error> {
        sqlx::query_as::<_, MessageRate>(
            r#"
            SELECT date_trunc('minute', created_at) AS minute, COUNT(*) AS message_count
            FROM messages
            WHERE created_at BETWEEN $1 AND $2
            GROUP BY date_trunc('minute', created_at)
            ORDER BY minute
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn top_users(&self, limit: i64) -> Result<Vec<UserStats>, sqlx::Error> {
        sqlx::query_as::<_, UserStats>(
            r#"
            SELECT user_id, username, COUNT(*) AS message_count
            FROM messages
            GROUP BY user_id, username
            ORDER BY message_count DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn top_rooms(&self, limit: i64) -> Result<Vec<RoomStats>, sqlx::Error> {
        sqlx::query_as::<_, RoomStats>(
            r#"
            SELECT room_id, COUNT(*) AS message_count,
                   COUNT(DISTINCT user_id) AS unique_users
            FROM messages
            GROUP BY room_id
            ORDER BY message_count DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

/// Id deterministico dal contenuto: le riconsegne dello stesso messaggio
/// producono lo stesso id, e il conflitto su `(message_id, created_at)`
/// le riduce ad una sola riga.
fn message_id_for(queued: &QueuedMessage) -> Uuid {
    let msg = &queued.chat_message;
    let seed = format!(
        "{}:{}:{}:{}:{}",
        queued.room_id, msg.user_id, msg.username, queued.received_timestamp, msg.message
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes())
}

impl MessageStore for MessageRepository {
    #[instrument(skip(self, batch), fields(rows = batch.len()))]
    async fn batch_insert(&self, batch: &[QueuedMessage]) -> Result<u64, sqlx::Error> {
        if batch.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut ids = Vec::with_capacity(batch.len());
        let mut room_ids = Vec::with_capacity(batch.len());
        let mut user_ids = Vec::with_capacity(batch.len());
        let mut usernames = Vec::with_capacity(batch.len());
        let mut texts = Vec::with_capacity(batch.len());
        let mut types = Vec::with_capacity(batch.len());
        let mut client_ts = Vec::with_capacity(batch.len());
        let mut server_ts = Vec::with_capacity(batch.len());
        let mut created = Vec::with_capacity(batch.len());

        for queued in batch {
            let msg = &queued.chat_message;
            let server = DateTime::<Utc>::from_timestamp_millis(queued.received_timestamp)
                .unwrap_or(now);

            ids.push(message_id_for(queued));
            room_ids.push(queued.room_id);
            user_ids.push(msg.user_id);
            usernames.push(msg.username.clone());
            texts.push(msg.message.clone());
            types.push(msg.message_type.clone());
            // validato all'ingresso; un valore illeggibile degrada al
            // timestamp di ingresso invece di perdere il batch
            client_ts.push(
                DateTime::parse_from_rfc3339(&msg.timestamp)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or(server),
            );
            server_ts.push(server);
            // anche la chiave di partizione deriva dall'ingresso, così una
            // riconsegna colpisce la stessa riga
            created.push(server);
        }

        let result = sqlx::query(INSERT_BATCH_SQL)
            .bind(&ids)
            .bind(&room_ids)
            .bind(&user_ids)
            .bind(&usernames)
            .bind(&texts)
            .bind(&types)
            .bind(&client_ts)
            .bind(&server_ts)
            .bind(&created)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => {
                let rows = done.rows_affected();
                self.inserted.fetch_add(rows, Ordering::Relaxed);
                Ok(rows)
            }
            Err(e) => {
                self.failed.fetch_add(batch.len() as u64, Ordering::Relaxed);
                error!(error = %e, rows = batch.len(), "batch insert failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::ChatMessage;

    fn queued(text: &str, received: i64) -> QueuedMessage {
        QueuedMessage {
            chat_message: ChatMessage {
                user_id: 9,
                username: "sender1".to_string(),
                message: text.to_string(),
                timestamp: "2025-01-01T00:00:00Z".to_string(),
                message_type: "TEXT".to_string(),
                room_id: 2,
            },
            room_id: 2,
            received_timestamp: received,
        }
    }

    #[test]
    fn test_redelivery_maps_to_same_message_id() {
        let first = message_id_for(&queued("hello", 1_700_000_000_000));
        let second = message_id_for(&queued("hello", 1_700_000_000_000));
        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_messages_get_distinct_ids() {
        let a = message_id_for(&queued("hello", 1_700_000_000_000));
        let b = message_id_for(&queued("hello", 1_700_000_000_001));
        let c = message_id_for(&queued("hella", 1_700_000_000_000));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
