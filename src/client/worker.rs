//! Worker del load client: ciclo chiuso con retry e circuit breaker
//!
//! Ogni worker scoda, prende una connessione pooled della stanza, invia,
//! aspetta l'envelope di risposta (15s) e la rimette nel pool. Fino a 5
//! tentativi con backoff esponenziale 100·2^(n-1) ms; il breaker viene
//! consultato prima di ogni tentativo.

use crate::client::breaker::CircuitBreaker;
use crate::client::metrics::PerformanceMetrics;
use crate::client::pool::ConnectionPool;
use crate::dtos::ChatMessage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, warn};

const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 100;
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(15);
const BREAKER_WAIT: Duration = Duration::from_millis(100);
const DEQUEUE_WAIT: Duration = Duration::from_secs(1);
/// Coda del generatore oltre questa soglia: i worker rallentano.
const BACKPRESSURE_THRESHOLD: usize = 5_000;
const BACKPRESSURE_PAUSE: Duration = Duration::from_millis(10);

pub type SharedQueue = Arc<Mutex<mpsc::Receiver<ChatMessage>>>;

/// Invia fino a `quota` messaggi, poi termina. Termina prima se il
/// generatore chiude la coda.
#[instrument(skip_all, fields(worker_id))]
pub async fn run_worker(
    worker_id: usize,
    quota: usize,
    queue: SharedQueue,
    depth: Arc<AtomicUsize>,
    pool: Arc<ConnectionPool>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<PerformanceMetrics>,
) {
    let mut sent = 0;

    while sent < quota {
        // back-pressure dal breaker: in OPEN non si scoda nemmeno
        if breaker.is_open() {
            sleep(BREAKER_WAIT).await;
            continue;
        }

        let message = {
            let mut rx = queue.lock().await;
            timeout(DEQUEUE_WAIT, rx.recv()).await
        };
        let message = match message {
            Ok(Some(m)) => {
                depth.fetch_sub(1, Ordering::Relaxed);
                m
            }
            Ok(None) => break, // generatore finito
            Err(_) => continue,
        };

        // coda molto piena: rallenta il ritmo di invio
        if depth.load(Ordering::Relaxed) > BACKPRESSURE_THRESHOLD {
            sleep(BACKPRESSURE_PAUSE).await;
        }

        if send_with_retry(&message, &pool, &breaker, &metrics).await {
            sent += 1;
            breaker.record_success();
        } else {
            metrics.record_failure();
            breaker.record_failure();
        }
    }

    debug!(sent, "worker finished");
}

/// Un messaggio, fino a `MAX_RETRIES` tentativi. Ritorna `true` solo se
/// l'edge ha risposto con `status: "OK"`.
async fn send_with_retry(
    message: &ChatMessage,
    pool: &ConnectionPool,
    breaker: &CircuitBreaker,
    metrics: &PerformanceMetrics,
) -> bool {
    let started = Instant::now();
    let mut retries = 0;

    for attempt in 0..MAX_RETRIES {
        if !breaker.allow_request() {
            sleep(BREAKER_WAIT).await;
            continue;
        }

        if attempt > 0 {
            retries += 1;
            let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
            sleep(Duration::from_millis(backoff)).await;
        }

        let conn = match pool.get_connection(message.room_id).await {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, room_id = message.room_id, "connection unavailable");
                metrics.record_reconnection();
                continue;
            }
        };

        let json = match serde_json::to_string(message) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "unserializable message, dropping");
                pool.return_connection(message.room_id, conn).await;
                return false;
            }
        };

        if conn.send(json).await.is_err() {
            conn.close().await;
            continue;
        }

        match conn.wait_for_response(RESPONSE_TIMEOUT).await {
            Some(reply) => {
                let accepted = serde_json::from_str::<serde_json::Value>(&reply)
                    .ok()
                    .and_then(|v| {
                        v.get("status")
                            .and_then(|s| s.as_str())
                            .map(|s| s == "OK")
                    })
                    .unwrap_or(false);

                // risposta arrivata: la connessione è sana e torna nel pool
                pool.return_connection(message.room_id, conn).await;

                if accepted {
                    metrics.record_success(message, started.elapsed(), retries);
                    return true;
                }
                // envelope d'errore (es. QUEUE_ERROR): nuovo tentativo
                debug!(reply = %reply, "send rejected by edge");
            }
            None => {
                // timeout di risposta: la connessione non torna nel pool
                conn.close().await;
            }
        }
    }

    false
}
