//! Pipeline per consegna: deserializza, broadcast sul bus, offerta al writer
//!
//! L'ordine è vincolante: la consegna al bus precede l'ack al broker, la
//! persistenza è best-effort dopo l'ack. Una coda DB piena degrada in un
//! drop contato, mai in un fallimento del messaggio.

use crate::bus::BusPublisherHandle;
use crate::consumer::writer::WriterHandle;
use crate::dtos::{BroadcastMessage, QueuedMessage};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

pub struct MessageProcessor {
    bus: BusPublisherHandle,
    writer: Option<WriterHandle>,
    processed: AtomicU64,
    failed: AtomicU64,
    db_dropped: AtomicU64,
}

impl MessageProcessor {
    pub fn new(bus: BusPublisherHandle, writer: Option<WriterHandle>) -> Self {
        Self {
            bus,
            writer,
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            db_dropped: AtomicU64::new(0),
        }
    }

    /// `true` se la consegna può essere ackata, `false` se va nackata.
    pub async fn process(&self, payload: &[u8]) -> bool {
        let queued: QueuedMessage = match serde_json::from_slice(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "undeserializable delivery");
                self.failed.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        // 1. broadcast verso la stanza, via bus
        let broadcast = BroadcastMessage::from_queued(&queued, Utc::now().timestamp_millis());
        let json = match serde_json::to_string(&broadcast) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "failed to serialize broadcast");
                self.failed.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        if !self.bus.publish(queued.room_id, json).await {
            self.failed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        // 2. persistenza asincrona, non bloccante
        if let Some(writer) = &self.writer {
            if !writer.offer(queued).await {
                let dropped = self.db_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "database write queue full - message dropped");
            }
        }

        self.processed.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn db_dropped_count(&self) -> u64 {
        self.db_dropped.load(Ordering::Relaxed)
    }

    pub fn broadcast_count(&self) -> u64 {
        self.bus.published_count()
    }

    pub fn writer(&self) -> Option<&WriterHandle> {
        self.writer.as_ref()
    }
}
