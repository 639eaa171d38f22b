//! Connection pool del load client, con chiave per stanza
//!
//! Al massimo 10 connessioni parcheggiate per stanza; una presa dal pool che
//! risulta malsana viene scartata e rimpiazzata da una nuova con deadline di
//! handshake di 5 secondi. Un heartbeat pinga ogni 30s le connessioni a
//! riposo; un ping fallito marca la connessione malsana.

use crate::client::metrics::PerformanceMetrics;
use crate::core::error::ClientError;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

const MAX_CONNECTIONS_PER_ROOM: usize = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PING_INTERVAL: Duration = Duration::from_secs(30);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Connessione WebSocket pooled con coda di risposta dedicata.
///
/// Il task di lettura instrada nella coda solo gli envelope di risposta
/// (hanno `status` oppure `error`); i broadcast della stanza non competono
/// con la correlazione richiesta/risposta.
pub struct PooledConnection {
    room_id: i32,
    writer: Mutex<WsSink>,
    responses: Mutex<mpsc::UnboundedReceiver<String>>,
    healthy: Arc<AtomicBool>,
    last_activity_ms: Arc<AtomicU64>,
    reader: JoinHandle<()>,
}

impl PooledConnection {
    pub async fn connect(base_url: &str, room_id: i32) -> Result<Self, ClientError> {
        let url = format!("{}/{}", base_url, room_id);
        let (stream, _response) = timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| ClientError::ConnectTimeout)??;

        let (writer, mut read) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let healthy = Arc::new(AtomicBool::new(true));
        let last_activity_ms = Arc::new(AtomicU64::new(now_ms()));

        let reader = {
            let healthy = healthy.clone();
            let last_activity_ms = last_activity_ms.clone();
            tokio::spawn(async move {
                while let Some(frame) = read.next().await {
                    match frame {
                        Ok(Message::Text(text)) => {
                            last_activity_ms.store(now_ms(), Ordering::Relaxed);
                            if is_reply_envelope(text.as_str())
                                && tx.send(text.as_str().to_owned()).is_err()
                            {
                                break;
                            }
                        }
                        Ok(Message::Pong(_)) => {
                            last_activity_ms.store(now_ms(), Ordering::Relaxed);
                        }
                        Ok(Message::Close(frame)) => {
                            debug!(?frame, "connection closed by server");
                            healthy.store(false, Ordering::SeqCst);
                            break;
                        }
                        Err(e) => {
                            debug!(error = %e, "connection read error");
                            healthy.store(false, Ordering::SeqCst);
                            break;
                        }
                        _ => {}
                    }
                }
                healthy.store(false, Ordering::SeqCst);
            })
        };

        Ok(Self {
            room_id,
            writer: Mutex::new(writer),
            responses: Mutex::new(rx),
            healthy,
            last_activity_ms,
            reader,
        })
    }

    pub fn room_id(&self) -> i32 {
        self.room_id
    }

    pub fn is_connected(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub async fn send(&self, text: String) -> Result<(), ClientError> {
        let mut writer = self.writer.lock().await;
        writer.send(Message::Text(text.into())).await.map_err(|e| {
            self.healthy.store(false, Ordering::SeqCst);
            ClientError::from(e)
        })
    }

    /// Attende il prossimo envelope di risposta; `None` allo scadere.
    pub async fn wait_for_response(&self, wait: Duration) -> Option<String> {
        let mut responses = self.responses.lock().await;
        match timeout(wait, responses.recv()).await {
            Ok(Some(text)) => Some(text),
            _ => None,
        }
    }

    /// Ping sul socket sottostante; un errore marca la connessione malsana.
    pub async fn ping(&self) {
        let mut writer = self.writer.lock().await;
        if writer.send(Message::Ping(Bytes::new())).await.is_err() {
            self.healthy.store(false, Ordering::SeqCst);
        } else {
            self.last_activity_ms.store(now_ms(), Ordering::Relaxed);
        }
    }

    pub async fn close(&self) {
        self.healthy.store(false, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        let _ = writer.send(Message::Close(None)).await;
        self.reader.abort();
    }
}

/// Solo le risposte dell'edge hanno `status` (accettazione) o `error`
/// (rifiuto); tutto il resto è traffico di broadcast.
fn is_reply_envelope(text: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => value.get("status").is_some() || value.get("error").is_some(),
        Err(_) => false,
    }
}

pub struct ConnectionPool {
    base_url: String,
    pools: DashMap<i32, Arc<Mutex<Vec<PooledConnection>>>>,
    metrics: Arc<PerformanceMetrics>,
}

impl ConnectionPool {
    pub fn new(base_url: String, metrics: Arc<PerformanceMetrics>) -> Self {
        Self {
            base_url,
            pools: DashMap::new(),
            metrics,
        }
    }

    fn slot(&self, room_id: i32) -> Arc<Mutex<Vec<PooledConnection>>> {
        self.pools
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    /// Preleva una connessione sana dal pool o ne apre una nuova.
    pub async fn get_connection(&self, room_id: i32) -> Result<PooledConnection, ClientError> {
        let slot = self.slot(room_id);
        let mut stale = Vec::new();
        let reusable = {
            let mut pool = slot.lock().await;
            let mut found = None;
            while let Some(conn) = pool.pop() {
                if conn.is_connected() {
                    found = Some(conn);
                    break;
                }
                stale.push(conn);
            }
            found
        };
        for conn in stale {
            conn.close().await;
        }
        if let Some(conn) = reusable {
            return Ok(conn);
        }

        let conn = PooledConnection::connect(&self.base_url, room_id).await?;
        self.metrics.record_connection();
        Ok(conn)
    }

    /// Rimette la connessione nel pool solo se sana e c'è posto.
    pub async fn return_connection(&self, room_id: i32, conn: PooledConnection) {
        if !conn.is_connected() {
            conn.close().await;
            return;
        }

        let slot = self.slot(room_id);
        let mut pool = slot.lock().await;
        if pool.len() < MAX_CONNECTIONS_PER_ROOM {
            pool.push(conn);
        } else {
            drop(pool);
            conn.close().await;
        }
    }

    /// Heartbeat periodico sulle connessioni a riposo nel pool.
    pub fn start_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(PING_INTERVAL);
            tick.tick().await;
            loop {
                tick.tick().await;
                let slots: Vec<_> = pool.pools.iter().map(|e| e.value().clone()).collect();
                for slot in slots {
                    let idle = slot.lock().await;
                    for conn in idle.iter() {
                        if conn.is_connected() {
                            conn.ping().await;
                        }
                    }
                }
            }
        })
    }

    /// Chiude tutte le connessioni parcheggiate.
    pub async fn shutdown(&self) {
        let slots: Vec<_> = self.pools.iter().map(|e| e.value().clone()).collect();
        for slot in slots {
            let mut idle = slot.lock().await;
            for conn in idle.drain(..) {
                conn.close().await;
            }
        }
        self.pools.clear();
        info!("connection pool shut down");
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
