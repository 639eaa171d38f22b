//! Pubblicazione verso il broker, confinata al task della connessione
//!
//! Ogni task di connessione possiede il proprio canale in confirm mode: i
//! canali non si condividono. Un canale che va in errore viene scartato e
//! ricreato pigramente alla pubblicazione successiva.

use crate::core::error::QueueError;
use crate::dtos::QueuedMessage;
use crate::queue::topology::CHAT_EXCHANGE;
use crate::queue::Broker;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::{BasicProperties, Channel};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Contatori monotoni di pubblicazione, condivisi tra tutte le connessioni
/// di un processo edge. Letti solo per reporting.
#[derive(Default)]
pub struct PublisherCounters {
    pub published: AtomicU64,
    pub failed: AtomicU64,
}

impl PublisherCounters {
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Publisher posseduto da un singolo task di connessione.
pub struct RoomPublisher {
    broker: Arc<Broker>,
    channel: Option<Channel>,
    counters: Arc<PublisherCounters>,
}

impl RoomPublisher {
    pub fn new(broker: Arc<Broker>, counters: Arc<PublisherCounters>) -> Self {
        Self {
            broker,
            channel: None,
            counters,
        }
    }

    /// Pubblica un messaggio persistente con il roomId come routing key.
    ///
    /// Il successo è il send locale: la publisher-confirm è abilitata ma non
    /// attesa, per non pagare un RTT di broker sulla latenza di ACK.
    pub async fn publish(&mut self, queued: &QueuedMessage) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(queued)?;

        let channel = match self.channel.take() {
            Some(ch) => ch,
            None => {
                let ch = self.broker.create_channel().await?;
                ch.confirm_select(ConfirmSelectOptions::default()).await?;
                debug!("created new publish channel");
                ch
            }
        };

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2);

        match channel
            .basic_publish(
                CHAT_EXCHANGE,
                &queued.room_id.to_string(),
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
        {
            Ok(_confirm) => {
                // Il canale è sano: lo teniamo per la prossima pubblicazione
                self.channel = Some(channel);
                let count = self.counters.published.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 10_000 == 0 {
                    info!(published = count, "messages published to broker");
                }
                Ok(())
            }
            Err(e) => {
                // Canale in stato incerto: scartato, ricreato al prossimo uso
                warn!(error = %e, room_id = queued.room_id, "publish failed, discarding channel");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                Err(e.into())
            }
        }
    }
}
