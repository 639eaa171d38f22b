//! Topologia del broker: un exchange diretto, una coda durevole per stanza,
//! una dead-letter queue. Tutte le declare sono idempotenti.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};
use tracing::info;

pub const CHAT_EXCHANGE: &str = "chat.exchange";
pub const DLX_EXCHANGE: &str = "chat.dlx.exchange";
pub const DLQ_QUEUE: &str = "chat.dlq";
pub const DLQ_ROUTING_KEY: &str = "dlq";
const ROOM_QUEUE_PREFIX: &str = "chat.room.";

/// Le stanze sono numerate 1..=ROOM_COUNT.
pub const ROOM_COUNT: i32 = 20;

/// Limite per coda: oltre, i messaggi più vecchi finiscono nella DLQ.
const ROOM_QUEUE_MAX_LENGTH: i32 = 50_000;

pub fn room_queue_name(room_id: i32) -> String {
    format!("{}{}", ROOM_QUEUE_PREFIX, room_id)
}

/// Dichiara exchange principale, DLX e DLQ. Chiamata da edge e consumer.
pub async fn declare_exchanges(channel: &Channel) -> Result<(), lapin::Error> {
    channel
        .exchange_declare(
            DLX_EXCHANGE,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_declare(
            DLQ_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            DLQ_QUEUE,
            DLX_EXCHANGE,
            DLQ_ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    channel
        .exchange_declare(
            CHAT_EXCHANGE,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    info!("broker exchanges and DLQ configured");
    Ok(())
}

/// Dichiara la coda di una stanza e la lega all'exchange con il roomId come
/// routing key. Sicura da richiamare più volte.
pub async fn declare_room_queue(channel: &Channel, room_id: i32) -> Result<(), lapin::Error> {
    let mut args = FieldTable::default();
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(DLX_EXCHANGE.into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(DLQ_ROUTING_KEY.into()),
    );
    args.insert("x-max-length".into(), AMQPValue::LongInt(ROOM_QUEUE_MAX_LENGTH));

    let queue_name = room_queue_name(room_id);

    channel
        .queue_declare(
            &queue_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            args,
        )
        .await?;

    channel
        .queue_bind(
            &queue_name,
            CHAT_EXCHANGE,
            &room_id.to_string(),
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    Ok(())
}
