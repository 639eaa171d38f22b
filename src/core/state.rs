//! Application State - Stato globale del processo edge
//!
//! Contiene le mappe di membership delle stanze, la connessione al broker e i
//! contatori di pubblicazione, condivisi tra tutte le connessioni.

use crate::queue::publisher::PublisherCounters;
use crate::queue::Broker;
use crate::ws::roommap::RoomMap;
use std::sync::Arc;

/// Stato condiviso tra handler WebSocket e bridge del bus.
///
/// L'edge possiede la `RoomMap`; il bridge ne riceve solo un handle in
/// lettura per il fan-out (nessuna ownership ciclica).
pub struct AppState {
    /// Mappe di membership: connessione -> stanza e stanza -> connessioni
    pub rooms: Arc<RoomMap>,

    /// Connessione condivisa al broker; ogni task di connessione apre i
    /// propri canali da qui
    pub broker: Arc<Broker>,

    /// Contatori di pubblicazione (monotoni, solo reporting)
    pub counters: Arc<PublisherCounters>,
}

impl AppState {
    pub fn new(broker: Broker) -> Self {
        Self {
            rooms: Arc::new(RoomMap::new()),
            broker: Arc::new(broker),
            counters: Arc::new(PublisherCounters::default()),
        }
    }
}
