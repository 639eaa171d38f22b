//! Batch writer asincrono verso lo storage
//!
//! I worker del consumer offrono su una coda bounded; W task writer
//! accumulano fino a `batch_size` righe o `flush_interval`, poi eseguono un
//! singolo batch insert. Alla chiusura dell'intake ogni writer svuota quel
//! che resta, anche con un batch corto.

use crate::dtos::QueuedMessage;
use crate::repositories::MessageStore;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

/// Coda tra consumer e writer: oltre questa soglia le offerte falliscono.
const WRITE_QUEUE_CAPACITY: usize = 50_000;
/// Timeout dell'offerta: scaduto, il messaggio è un drop del chiamante.
const OFFER_TIMEOUT: Duration = Duration::from_millis(100);
/// Poll della coda da parte dei writer.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);
/// Oltre questa durata il flush viene loggato come lento.
const SLOW_BATCH_THRESHOLD: Duration = Duration::from_secs(1);

type SharedReceiver = Arc<Mutex<mpsc::Receiver<QueuedMessage>>>;

/// Handle condiviso dai worker; rilasciare tutti i cloni chiude l'intake e
/// avvia il drenaggio finale.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<QueuedMessage>,
    queued: Arc<AtomicU64>,
    written: Arc<AtomicU64>,
    depth: Arc<AtomicI64>,
}

impl WriterHandle {
    /// Offerta non bloccante oltre il timeout. `false` = coda piena.
    pub async fn offer(&self, message: QueuedMessage) -> bool {
        match self.tx.send_timeout(message, OFFER_TIMEOUT).await {
            Ok(()) => {
                self.queued.fetch_add(1, Ordering::Relaxed);
                self.depth.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }

    pub fn queued_count(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn written_count(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> i64 {
        self.depth.load(Ordering::Relaxed).max(0)
    }
}

pub struct BatchWriter;

impl BatchWriter {
    /// Avvia i task writer sopra lo store dato.
    pub fn spawn<S: MessageStore + 'static>(
        store: Arc<S>,
        batch_size: usize,
        flush_interval: Duration,
        writer_tasks: usize,
    ) -> (WriterHandle, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));
        let queued = Arc::new(AtomicU64::new(0));
        let written = Arc::new(AtomicU64::new(0));
        let depth = Arc::new(AtomicI64::new(0));

        info!(
            batch_size,
            flush_interval_ms = flush_interval.as_millis() as u64,
            writer_tasks,
            "batch database writer started"
        );

        let handles = (0..writer_tasks)
            .map(|writer_id| {
                tokio::spawn(run_writer(
                    writer_id,
                    store.clone(),
                    rx.clone(),
                    batch_size,
                    flush_interval,
                    written.clone(),
                    depth.clone(),
                ))
            })
            .collect();

        (
            WriterHandle {
                tx,
                queued,
                written,
                depth,
            },
            handles,
        )
    }
}

async fn run_writer<S: MessageStore>(
    writer_id: usize,
    store: Arc<S>,
    rx: SharedReceiver,
    batch_size: usize,
    flush_interval: Duration,
    written: Arc<AtomicU64>,
    depth: Arc<AtomicI64>,
) {
    let mut batch: Vec<QueuedMessage> = Vec::with_capacity(batch_size);
    let mut last_flush = Instant::now();

    loop {
        // il lock copre solo la recv: i flush avvengono fuori, in parallelo
        let received = {
            let mut rx = rx.lock().await;
            timeout(POLL_TIMEOUT, rx.recv()).await
        };

        let mut closed = false;
        match received {
            Ok(Some(message)) => {
                depth.fetch_sub(1, Ordering::Relaxed);
                batch.push(message);
            }
            Ok(None) => closed = true,
            Err(_) => {} // timeout di poll: si valuta solo il flush a tempo
        }

        let should_flush = !batch.is_empty()
            && (batch.len() >= batch_size || last_flush.elapsed() >= flush_interval || closed);

        if should_flush {
            flush_batch(writer_id, store.as_ref(), &mut batch, &written).await;
            last_flush = Instant::now();
        }

        if closed {
            break;
        }
    }

    if !batch.is_empty() {
        flush_batch(writer_id, store.as_ref(), &mut batch, &written).await;
    }

    info!(writer_id, "database writer stopped");
}

async fn flush_batch<S: MessageStore>(
    writer_id: usize,
    store: &S,
    batch: &mut Vec<QueuedMessage>,
    written: &AtomicU64,
) {
    let started = Instant::now();

    match store.batch_insert(batch).await {
        Ok(rows) => {
            written.fetch_add(rows, Ordering::Relaxed);
        }
        Err(e) => {
            // il broker ha già ackato: il batch è perso, si continua
            warn!(writer_id, error = %e, rows = batch.len(), "batch lost");
        }
    }

    let elapsed = started.elapsed();
    if elapsed > SLOW_BATCH_THRESHOLD {
        warn!(
            writer_id,
            rows = batch.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "slow batch"
        );
    }

    batch.clear();
}
