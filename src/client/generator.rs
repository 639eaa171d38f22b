//! Generatore di carico: messaggi casuali su una coda bounded
//!
//! Distribuzione dei tipi: 90% TEXT, 5% JOIN, 5% LEAVE. Il put è bloccante:
//! la coda piena rallenta il generatore, non perde messaggi.

use crate::dtos::ChatMessage;
use crate::entities::MessageType;
use crate::queue::ROOM_COUNT;
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

const MESSAGE_POOL: [&str; 24] = [
    "Hello everyone!",
    "How's it going?",
    "Great to be here",
    "Anyone online?",
    "What's up folks?",
    "Good morning!",
    "Nice to meet you all",
    "That's interesting",
    "I agree completely",
    "Tell me more",
    "Sounds good to me",
    "Count me in",
    "Makes sense",
    "Thanks for sharing",
    "Well said",
    "Good point",
    "That's helpful",
    "Thanks everyone",
    "See you later",
    "Take care all",
    "Great discussion",
    "Keep it up",
    "Happy to be here",
    "Stay tuned",
];

/// Produce `total` messaggi; `depth` traccia la profondità della coda per
/// la back-pressure dei worker.
pub async fn generate_messages(
    tx: mpsc::Sender<ChatMessage>,
    total: usize,
    depth: Arc<AtomicUsize>,
) {
    info!(total, "message generator started");

    for produced in 0..total {
        let message = random_message();
        depth.fetch_add(1, Ordering::Relaxed);
        if tx.send(message).await.is_err() {
            depth.fetch_sub(1, Ordering::Relaxed);
            warn!(produced, "message queue closed, generator stopping early");
            return;
        }

        if (produced + 1) % 50_000 == 0 {
            info!(generated = produced + 1, "generating load");
        }
    }

    info!(total, "message generator completed");
}

pub fn random_message() -> ChatMessage {
    let mut rng = rand::thread_rng();

    let user_id: i32 = rng.gen_range(1..=100_000);
    let username = format!("user{}", user_id);
    let room_id: i32 = rng.gen_range(1..=ROOM_COUNT);
    let message_type = random_type(&mut rng);

    let message = match message_type {
        MessageType::Text => MESSAGE_POOL[rng.gen_range(0..MESSAGE_POOL.len())].to_string(),
        MessageType::Join => format!("{} has joined the chat", username),
        MessageType::Leave => format!("{} has left the chat", username),
    };

    ChatMessage {
        user_id,
        username,
        message,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        message_type: message_type.as_str().to_string(),
        room_id,
    }
}

fn random_type(rng: &mut impl Rng) -> MessageType {
    match rng.gen_range(0..100) {
        0..=89 => MessageType::Text,
        90..=94 => MessageType::Join,
        _ => MessageType::Leave,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_generated_messages_always_validate() {
        for _ in 0..500 {
            let msg = random_message();
            assert!(msg.validate().is_ok(), "generated message failed validation");
            assert!((1..=ROOM_COUNT).contains(&msg.room_id));
        }
    }

    #[test]
    fn test_type_distribution_is_roughly_ninety_five_five() {
        let mut text = 0;
        let mut join = 0;
        let mut leave = 0;
        for _ in 0..10_000 {
            match random_message().message_type.as_str() {
                "TEXT" => text += 1,
                "JOIN" => join += 1,
                "LEAVE" => leave += 1,
                other => panic!("unexpected type {}", other),
            }
        }
        // tolleranze larghe, il test non deve essere flaky
        assert!(text > 8_500 && text < 9_500);
        assert!(join > 200 && join < 900);
        assert!(leave > 200 && leave < 900);
    }

    #[tokio::test]
    async fn test_generator_fills_queue_and_closes() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let depth = Arc::new(AtomicUsize::new(0));

        let producer = tokio::spawn(generate_messages(tx, 100, depth.clone()));

        let mut received = 0;
        while rx.recv().await.is_some() {
            depth.fetch_sub(1, Ordering::Relaxed);
            received += 1;
        }
        producer.await.unwrap();

        assert_eq!(received, 100);
        assert_eq!(depth.load(Ordering::Relaxed), 0);
    }
}
