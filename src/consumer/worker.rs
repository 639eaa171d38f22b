//! Worker del consumer: una coda di stanza, ack a batch
//!
//! Ogni worker possiede il proprio canale con prefetch limitato e consuma
//! una sola coda. Gli ack partono ogni `ACK_BATCH_SIZE` consegne come
//! multi-ack fino al tag più alto visto; un fallimento forza prima il flush
//! del batch pendente e poi il nack (senza requeue) della consegna fallita.

use crate::consumer::processor::MessageProcessor;
use crate::core::config::ConsumerSettings;
use crate::core::error::ConsumerError;
use crate::queue::{room_queue_name, Broker};
use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

/// Un multi-ack ogni tante consegne riuscite.
const ACK_BATCH_SIZE: u32 = 100;

/// Stato del batching degli ack. Il multi-ack è valido solo se dal flush
/// precedente non è passato nessun nack: chi fallisce chiama `take()` prima
/// di nackare.
#[derive(Debug, Default)]
pub struct AckBatch {
    last_tag: u64,
    count: u32,
}

impl AckBatch {
    /// Registra una consegna riuscita; ritorna il tag fino a cui mandare un
    /// multi-ack quando il batch è pieno.
    pub fn record(&mut self, delivery_tag: u64) -> Option<u64> {
        self.last_tag = delivery_tag;
        self.count += 1;
        if self.count >= ACK_BATCH_SIZE {
            self.count = 0;
            Some(self.last_tag)
        } else {
            None
        }
    }

    /// Svuota il batch pendente, se c'è qualcosa da ackare.
    pub fn take(&mut self) -> Option<u64> {
        if self.count > 0 {
            self.count = 0;
            Some(self.last_tag)
        } else {
            None
        }
    }
}

#[instrument(skip(broker, processor, settings, shutdown), fields(worker_id, room_id))]
pub async fn run_worker(
    worker_id: usize,
    room_id: i32,
    broker: Arc<Broker>,
    processor: Arc<MessageProcessor>,
    settings: ConsumerSettings,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ConsumerError> {
    let channel = broker.create_channel().await?;
    channel
        .basic_qos(settings.prefetch_count, BasicQosOptions::default())
        .await?;

    let queue = room_queue_name(room_id);
    let consumer_tag = format!("consumer-{}-room-{}", worker_id, room_id);
    let mut consumer = channel
        .basic_consume(
            &queue,
            &consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    info!(queue, "consumer started");

    let mut acks = AckBatch::default();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            delivery = consumer.next() => {
                let Some(delivery) = delivery else {
                    warn!("consume stream ended");
                    break;
                };
                let delivery = match delivery {
                    Ok(d) => d,
                    Err(e) => {
                        error!(error = %e, "broker delivery error");
                        return Err(e.into());
                    }
                };

                let delivery_tag = delivery.delivery_tag;
                if processor.process(&delivery.data).await {
                    if let Some(up_to) = acks.record(delivery_tag) {
                        if let Err(e) = channel
                            .basic_ack(up_to, BasicAckOptions { multiple: true })
                            .await
                        {
                            // consegne orfane: il broker le riconsegnerà,
                            // lo storage è idempotente
                            error!(error = %e, up_to, "batch ack failed, stopping worker");
                            return Err(e.into());
                        }
                    }
                } else {
                    // prima il flush del batch riuscito, poi il nack
                    if let Some(up_to) = acks.take() {
                        if let Err(e) = channel
                            .basic_ack(up_to, BasicAckOptions { multiple: true })
                            .await
                        {
                            error!(error = %e, up_to, "pre-nack ack failed, stopping worker");
                            return Err(e.into());
                        }
                    }
                    if let Err(e) = channel
                        .basic_nack(
                            delivery_tag,
                            BasicNackOptions {
                                multiple: false,
                                requeue: false,
                            },
                        )
                        .await
                    {
                        error!(error = %e, delivery_tag, "nack failed, stopping worker");
                        return Err(e.into());
                    }
                }
            }
        }
    }

    // flush finale prima di uscire
    if let Some(up_to) = acks.take() {
        if let Err(e) = channel
            .basic_ack(up_to, BasicAckOptions { multiple: true })
            .await
        {
            warn!(error = %e, up_to, "final ack failed during shutdown");
        }
    }

    info!("consumer stopped");
    Ok(())
}
