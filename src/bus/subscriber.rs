//! Bridge del bus sull'edge: dal pattern `chatroom:*` ai socket locali
//!
//! Un solo subscriber per processo. Alla consegna estrae il roomId dal
//! suffisso del canale e scrive il payload grezzo ad ogni connessione
//! registrata per quella stanza. La caduta della sottoscrizione viene
//! riassorbita riconnettendosi per sempre a intervallo fisso.

use crate::bus::{CHANNEL_PATTERN, CHANNEL_PREFIX};
use crate::core::config::BusConfig;
use crate::ws::roommap::RoomMap;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

const RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Gira finché non arriva il segnale di shutdown; ogni errore di
/// sottoscrizione viene ritentato dopo `RECONNECT_DELAY`.
pub async fn run_subscriber(
    config: BusConfig,
    rooms: Arc<RoomMap>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match subscribe_once(&config, &rooms, &mut shutdown).await {
            Ok(()) => break, // shutdown richiesto
            Err(e) => {
                warn!(error = %e, "bus subscriber disconnected, reconnecting");
                sleep(RECONNECT_DELAY).await;
            }
        }
    }

    info!("bus subscriber stopped");
}

async fn subscribe_once(
    config: &BusConfig,
    rooms: &RoomMap,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), redis::RedisError> {
    let client = redis::Client::open(config.url())?;
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(CHANNEL_PATTERN).await?;
    info!(pattern = CHANNEL_PATTERN, "bus subscriber listening");

    let mut stream = pubsub.on_message();
    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            msg = stream.next() => match msg {
                Some(msg) => deliver(rooms, &msg),
                None => {
                    return Err(redis::RedisError::from((
                        redis::ErrorKind::IoError,
                        "pubsub stream closed",
                    )))
                }
            }
        }
    }
}

/// Fan-out di un singolo messaggio del bus alla stanza locale.
fn deliver(rooms: &RoomMap, msg: &redis::Msg) {
    let channel = msg.get_channel_name();
    let Some(room_id) = channel
        .strip_prefix(CHANNEL_PREFIX)
        .and_then(|suffix| suffix.parse::<i32>().ok())
    else {
        warn!(channel, "unexpected bus channel name");
        return;
    };

    let payload: String = match msg.get_payload() {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, channel, "undecodable bus payload");
            return;
        }
    };

    rooms.broadcast(room_id, Arc::from(payload));
}
