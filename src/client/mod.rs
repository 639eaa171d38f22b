//! Load Client - Generatore closed-loop con pool e circuit breaker
//!
//! Un generatore riempie una coda bounded; M worker scodano, inviano su
//! connessioni pooled per stanza e aspettano l'envelope di risposta. Il
//! circuit breaker tiene onesto il carico sotto failure parziale.

pub mod breaker;
pub mod generator;
pub mod metrics;
pub mod pool;
pub mod worker;

pub use breaker::{BreakerState, CircuitBreaker};
pub use generator::generate_messages;
pub use metrics::PerformanceMetrics;
pub use pool::{ConnectionPool, PooledConnection};
pub use worker::run_worker;

use crate::core::config::ClientSettings;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// Capacità della coda tra generatore e worker.
const GENERATOR_QUEUE_CAPACITY: usize = 10_000;
const METRICS_CSV_PATH: &str = "performance_metrics.csv";

pub struct LoadClient {
    settings: ClientSettings,
    metrics: Arc<PerformanceMetrics>,
    pool: Arc<ConnectionPool>,
    breaker: Arc<CircuitBreaker>,
}

impl LoadClient {
    pub fn new(settings: ClientSettings) -> Self {
        let metrics = Arc::new(PerformanceMetrics::new());
        let pool = Arc::new(ConnectionPool::new(
            settings.server_url.clone(),
            metrics.clone(),
        ));
        Self {
            settings,
            metrics,
            pool,
            breaker: Arc::new(CircuitBreaker::new()),
        }
    }

    pub async fn run(self) {
        let total = self.settings.total_messages;
        let workers = self.settings.workers.max(1);
        info!(total, workers, url = %self.settings.server_url, "starting load test");

        let (tx, rx) = mpsc::channel(GENERATOR_QUEUE_CAPACITY);
        let depth = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(Mutex::new(rx));

        let generator = tokio::spawn(generate_messages(tx, total, depth.clone()));
        let heartbeat = self.pool.start_heartbeat();

        self.metrics.mark_started();

        // la quota si divide tra i worker; il resto va al primo
        let base_quota = total / workers;
        let remainder = total % workers;

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let quota = base_quota + if worker_id == 0 { remainder } else { 0 };
            handles.push(tokio::spawn(run_worker(
                worker_id,
                quota,
                queue.clone(),
                depth.clone(),
                self.pool.clone(),
                self.breaker.clone(),
                self.metrics.clone(),
            )));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task failed");
            }
        }
        let _ = generator.await;

        self.metrics.mark_ended();
        info!(state = ?self.breaker.state(), "final circuit breaker state");

        heartbeat.abort();
        self.pool.shutdown().await;

        self.metrics.print_report();
        if let Err(e) = self.metrics.write_csv(METRICS_CSV_PATH) {
            warn!(error = %e, "failed to write metrics CSV");
        }
    }
}
