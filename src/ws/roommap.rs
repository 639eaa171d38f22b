//! RoomMap - mappe di membership dell'edge
//!
//! Due mappe concorrenti: connessione -> stanza (1:1) e stanza -> insieme di
//! connessioni (1:N). Le scritture avvengono solo su open/close; le letture
//! (broadcast) sono il percorso caldo e non prendono lock esclusivi.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

pub type ConnId = u64;

/// Frame in uscita verso una singola connessione. Il task di scrittura è
/// l'unico proprietario del sink del socket.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Envelope di risposta ad un frame del mittente
    Reply(String),
    /// Payload grezzo arrivato dal bus, condiviso tra tutte le connessioni
    /// della stanza
    Broadcast(Arc<str>),
    /// Chiusura con codice applicativo
    Close { code: u16, reason: &'static str },
    /// Il task di lettura è terminato: chiudere senza frame di close
    Shutdown,
}

pub struct RoomMap {
    next_id: AtomicU64,
    connections: DashMap<ConnId, i32>,
    rooms: DashMap<i32, DashMap<ConnId, UnboundedSender<Outbound>>>,
}

impl RoomMap {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Registra una connessione sotto una stanza e ritorna il suo id.
    pub fn register(&self, room_id: i32, tx: UnboundedSender<Outbound>) -> ConnId {
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.connections.insert(conn_id, room_id);
        self.rooms.entry(room_id).or_default().insert(conn_id, tx);
        info!(
            room_id,
            in_room = self.room_size(room_id),
            "new connection registered"
        );
        conn_id
    }

    /// Rimuove la connessione da entrambe le mappe. Idempotente.
    pub fn unregister(&self, conn_id: ConnId) {
        let Some((_, room_id)) = self.connections.remove(&conn_id) else {
            return;
        };

        if let Some(room) = self.rooms.get(&room_id) {
            room.remove(&conn_id);
            let empty = room.is_empty();
            drop(room); // rilascia il guard prima di toccare di nuovo la mappa
            if empty {
                self.rooms.remove_if(&room_id, |_, conns| conns.is_empty());
            }
        }
        info!(room_id, "connection closed");
    }

    /// Consegna best-effort ad ogni connessione della stanza; un receiver
    /// chiuso non blocca gli altri. Ritorna quante consegne sono partite.
    pub fn broadcast(&self, room_id: i32, payload: Arc<str>) -> usize {
        let Some(room) = self.rooms.get(&room_id) else {
            return 0;
        };

        let mut delivered = 0;
        for entry in room.iter() {
            if entry.value().send(Outbound::Broadcast(payload.clone())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Segnala lo shutdown a tutte le connessioni aperte.
    pub fn shutdown_all(&self) {
        let mut notified = 0;
        for room in self.rooms.iter() {
            for entry in room.iter() {
                if entry.value().send(Outbound::Shutdown).is_err() {
                    warn!("connection already gone during shutdown");
                } else {
                    notified += 1;
                }
            }
        }
        info!(notified, "shutdown signalled to open connections");
    }

    pub fn room_size(&self, room_id: i32) -> usize {
        self.rooms.get(&room_id).map(|r| r.len()).unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Stanza della connessione, se ancora registrata.
    pub fn room_of(&self, conn_id: ConnId) -> Option<i32> {
        self.connections.get(&conn_id).map(|r| *r)
    }
}

impl Default for RoomMap {
    fn default() -> Self {
        Self::new()
    }
}
