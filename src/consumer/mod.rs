//! Consumer Module - Drena le code per stanza, broadcast e persistenza
//!
//! Un'applicazione consumer avvia `CONSUMERS_PER_ROOM` worker per ciascuna
//! delle 20 stanze, un publisher batched verso il bus, i writer del
//! database e un monitor periodico. Lo shutdown è ordinato: prima i worker
//! (con flush degli ack), poi il drenaggio del writer, infine i pool.

pub mod processor;
pub mod worker;
pub mod writer;

pub use processor::MessageProcessor;
pub use worker::run_worker;
pub use writer::{BatchWriter, WriterHandle};

use crate::bus::BusPublisher;
use crate::core::config::Config;
use crate::core::error::ConsumerError;
use crate::queue::{declare_exchanges, declare_room_queue, Broker, ROOM_COUNT};
use crate::repositories::{ensure_partitions, run_partition_manager, MessageRepository};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

const WORKER_JOIN_BUDGET: Duration = Duration::from_secs(30);
const BUS_JOIN_BUDGET: Duration = Duration::from_secs(5);
const DB_POOL_MAX_CONNECTIONS: u32 = 50;
const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const MONITOR_INTERVAL: Duration = Duration::from_secs(10);

pub struct ConsumerApp {
    broker: Arc<Broker>,
    processor: Arc<MessageProcessor>,
    repository: Option<Arc<MessageRepository>>,
    pool: Option<PgPool>,
    worker_handles: Vec<JoinHandle<Result<(), ConsumerError>>>,
    writer_handles: Vec<JoinHandle<()>>,
    bus_handle: JoinHandle<()>,
    partition_handle: Option<JoinHandle<()>>,
    monitor_handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_grace: Duration,
}

impl ConsumerApp {
    pub async fn start(config: Config) -> Result<Self, ConsumerError> {
        let settings = config.consumer.clone();

        info!(
            rooms = ROOM_COUNT,
            consumers_per_room = settings.consumers_per_room,
            prefetch = settings.prefetch_count,
            persistence = settings.enable_persistence,
            "starting consumer"
        );

        let broker = Arc::new(Broker::connect(&config.broker, "chatflow-consumer").await?);

        // topologia completa: exchange, DLQ e tutte le code di stanza
        let setup = broker.create_channel().await?;
        declare_exchanges(&setup).await?;
        for room_id in 1..=ROOM_COUNT {
            declare_room_queue(&setup, room_id).await?;
        }
        info!(rooms = ROOM_COUNT, "room queues declared");

        // pipeline di persistenza, solo se abilitata
        let (pool, repository, writer_handle, writer_handles, partition_handle) =
            if settings.enable_persistence {
                let pool = PgPoolOptions::new()
                    .max_connections(DB_POOL_MAX_CONNECTIONS)
                    .acquire_timeout(DB_ACQUIRE_TIMEOUT)
                    .connect(&config.db.url())
                    .await?;
                ensure_partitions(&pool).await?;

                let repository = Arc::new(MessageRepository::new(pool.clone()));
                let (handle, tasks) = BatchWriter::spawn(
                    repository.clone(),
                    settings.db_batch_size,
                    settings.db_flush_interval,
                    settings.db_writer_threads,
                );
                let partitions = tokio::spawn(run_partition_manager(pool.clone()));
                (Some(pool), Some(repository), Some(handle), tasks, Some(partitions))
            } else {
                info!("running WITHOUT database persistence");
                (None, None, None, Vec::new(), None)
            };

        let (bus, bus_handle) = BusPublisher::spawn(config.bus.clone());
        let processor = Arc::new(MessageProcessor::new(bus, writer_handle));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut worker_handles =
            Vec::with_capacity(ROOM_COUNT as usize * settings.consumers_per_room);
        let mut worker_id = 0;
        for room_id in 1..=ROOM_COUNT {
            for _ in 0..settings.consumers_per_room {
                worker_id += 1;
                worker_handles.push(tokio::spawn(run_worker(
                    worker_id,
                    room_id,
                    broker.clone(),
                    processor.clone(),
                    settings.clone(),
                    shutdown_rx.clone(),
                )));
            }
        }
        info!(workers = worker_handles.len(), "all consumers started");

        let monitor_handle = tokio::spawn(run_monitor(processor.clone()));

        Ok(Self {
            broker,
            processor,
            repository,
            pool,
            worker_handles,
            writer_handles,
            bus_handle,
            partition_handle,
            monitor_handle,
            shutdown_tx,
            shutdown_grace: settings.shutdown_grace,
        })
    }

    /// Shutdown ordinato: worker -> writer -> bus -> broker -> pool.
    pub async fn shutdown(self) {
        info!("shutting down consumer");
        let _ = self.shutdown_tx.send(true);

        let deadline = Instant::now() + WORKER_JOIN_BUDGET;
        for handle in self.worker_handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!(error = %e, "worker ended with error"),
                Ok(Err(e)) => warn!(error = %e, "worker task panicked"),
                Err(_) => warn!("worker did not stop within budget"),
            }
        }

        // abort + join: il monitor tiene un Arc del processor e deve averlo
        // rilasciato prima che il drenaggio del writer possa completare
        self.monitor_handle.abort();
        let _ = self.monitor_handle.await;
        if let Some(partitions) = self.partition_handle {
            partitions.abort();
            let _ = partitions.await;
        }

        // statistiche finali prima di smontare la pipeline
        info!(
            processed = self.processor.processed_count(),
            failed = self.processor.failed_count(),
            broadcasts = self.processor.broadcast_count(),
            db_dropped = self.processor.db_dropped_count(),
            "final consumer statistics"
        );
        if let Some(repository) = &self.repository {
            info!(
                inserted = repository.inserted_count(),
                insert_failures = repository.failed_count(),
                "final storage statistics"
            );
        }

        // rilasciare il processor chiude l'intake del writer e del bus
        drop(self.processor);

        let deadline = Instant::now() + self.shutdown_grace;
        for handle in self.writer_handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if timeout(remaining, handle).await.is_err() {
                warn!("database writer did not drain within grace period");
            }
        }

        if timeout(BUS_JOIN_BUDGET, self.bus_handle).await.is_err() {
            warn!("bus publisher did not stop within budget");
        }

        self.broker.close().await;
        if let Some(pool) = self.pool {
            pool.close().await;
            info!("database pool closed");
        }

        info!("consumer shut down");
    }
}

/// Report periodico dei contatori della pipeline.
async fn run_monitor(processor: Arc<MessageProcessor>) {
    let mut tick = tokio::time::interval(MONITOR_INTERVAL);
    tick.tick().await;
    loop {
        tick.tick().await;
        if let Some(writer) = processor.writer() {
            info!(
                processed = processor.processed_count(),
                failed = processor.failed_count(),
                broadcasts = processor.broadcast_count(),
                db_queue_depth = writer.queue_depth(),
                db_queued = writer.queued_count(),
                db_written = writer.written_count(),
                db_dropped = processor.db_dropped_count(),
                "consumer stats"
            );
        } else {
            info!(
                processed = processor.processed_count(),
                failed = processor.failed_count(),
                broadcasts = processor.broadcast_count(),
                "consumer stats"
            );
        }
    }
}
