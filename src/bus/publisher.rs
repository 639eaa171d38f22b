//! Publisher del bus, disaccoppiato dai worker del consumer
//!
//! I worker consegnano su una coda bounded; un task dedicato costruisce
//! pipeline di publish (fino a 100 per batch, flush al riempimento o dopo
//! 10ms di poll). In caso di errore: 100ms di pausa, nuova connessione,
//! stesso batch. Mai scartare.

use crate::bus::channel_for;
use crate::core::config::BusConfig;
use redis::aio::MultiplexedConnection;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

/// Capacità della coda di hand-off tra worker e publisher.
const HANDOFF_CAPACITY: usize = 10_000;
/// Publish per pipeline prima del flush.
const BATCH_MAX: usize = 100;
/// Attesa massima di un elemento prima di flushare un batch parziale.
const POLL_TIMEOUT: Duration = Duration::from_millis(10);
/// Pausa dopo un errore di connessione o di pipeline.
const RETRY_DELAY: Duration = Duration::from_millis(100);
/// Timeout dell'offerta da parte dei worker.
const OFFER_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct PublishTask {
    pub room_id: i32,
    pub payload: String,
}

/// Handle condiviso dai worker del consumer.
#[derive(Clone)]
pub struct BusPublisherHandle {
    tx: mpsc::Sender<PublishTask>,
    published: Arc<AtomicU64>,
}

impl BusPublisherHandle {
    /// Offre un publish alla coda di hand-off. `false` se la coda resta
    /// piena oltre il timeout: per il chiamante è un fallimento di publish.
    pub async fn publish(&self, room_id: i32, payload: String) -> bool {
        self.tx
            .send_timeout(PublishTask { room_id, payload }, OFFER_TIMEOUT)
            .await
            .is_ok()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

pub struct BusPublisher;

impl BusPublisher {
    /// Avvia il task publisher. Il task termina quando tutti gli handle
    /// sono stati rilasciati e la coda è vuota, dopo il flush finale.
    pub fn spawn(config: BusConfig) -> (BusPublisherHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(HANDOFF_CAPACITY);
        let published = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run(config, rx, published.clone()));
        (BusPublisherHandle { tx, published }, task)
    }
}

async fn run(config: BusConfig, mut rx: mpsc::Receiver<PublishTask>, published: Arc<AtomicU64>) {
    info!(host = %config.host, port = config.port, "bus publisher started");

    let mut connection: Option<MultiplexedConnection> = None;
    let mut pending: Vec<PublishTask> = Vec::with_capacity(BATCH_MAX);

    while let Some(first) = rx.recv().await {
        pending.push(first);

        // riempi il batch finché c'è qualcosa in coda, senza aspettare
        // più di POLL_TIMEOUT per elemento
        while pending.len() < BATCH_MAX {
            match timeout(POLL_TIMEOUT, rx.recv()).await {
                Ok(Some(task)) => pending.push(task),
                Ok(None) | Err(_) => break,
            }
        }

        flush(&config, &mut connection, &mut pending, &published).await;
    }

    flush(&config, &mut connection, &mut pending, &published).await;
    info!(
        published = published.load(Ordering::Relaxed),
        "bus publisher stopped"
    );
}

/// Esegue il batch corrente in pipeline, riprovando finché non riesce.
async fn flush(
    config: &BusConfig,
    connection: &mut Option<MultiplexedConnection>,
    pending: &mut Vec<PublishTask>,
    published: &AtomicU64,
) {
    while !pending.is_empty() {
        if connection.is_none() {
            match connect(config).await {
                Ok(c) => *connection = Some(c),
                Err(e) => {
                    warn!(error = %e, "bus connection failed, retrying");
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            }
        }
        let Some(conn) = connection.as_mut() else {
            continue;
        };

        let mut pipe = redis::pipe();
        for task in pending.iter() {
            pipe.publish(channel_for(task.room_id), task.payload.as_str())
                .ignore();
        }

        let result: Result<(), redis::RedisError> = pipe.query_async(conn).await;
        match result {
            Ok(()) => {
                published.fetch_add(pending.len() as u64, Ordering::Relaxed);
                pending.clear();
            }
            Err(e) => {
                warn!(error = %e, batch = pending.len(), "bus pipeline failed, reconnecting");
                *connection = None;
                sleep(RETRY_DELAY).await;
            }
        }
    }
}

async fn connect(config: &BusConfig) -> Result<MultiplexedConnection, redis::RedisError> {
    let client = redis::Client::open(config.url())?;
    client.get_multiplexed_async_connection().await
}
