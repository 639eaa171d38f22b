//! WebSocket Module - Ingresso dei client sull'edge
//!
//! Gestisce l'upgrade HTTP -> WebSocket su `/chat/{room_id}`, la membership
//! delle stanze e il ciclo richiesta/envelope di risposta. Un path che non
//! identifica una stanza valida chiude il socket con codice 4000.

pub mod connection;
pub mod roommap;

pub use connection::handle_socket;
pub use roommap::{ConnId, Outbound, RoomMap};

use crate::core::state::AppState;
use crate::queue::ROOM_COUNT;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use std::sync::Arc;
use tracing::warn;

/// Codice di chiusura applicativo per stanza non valida.
pub const INVALID_ROOM_CODE: u16 = 4000;

/// Il segmento di path deve essere un intero in [1, ROOM_COUNT].
pub fn parse_room_id(raw: &str) -> Option<i32> {
    raw.parse::<i32>().ok().filter(|r| (1..=ROOM_COUNT).contains(r))
}

/// Entry point per le richieste di upgrade WebSocket.
///
/// Il path viene estratto come stringa: anche un segmento non numerico deve
/// arrivare fino all'upgrade per poter essere chiuso con 4000 invece di 404.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        match parse_room_id(&room_id) {
            Some(room_id) => handle_socket(socket, state, room_id).await,
            None => {
                warn!(room = %room_id, "invalid room id, closing connection");
                let mut socket = socket;
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: INVALID_ROOM_CODE,
                        reason: Utf8Bytes::from("Invalid room ID"),
                    })))
                    .await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_boundaries() {
        assert_eq!(parse_room_id("0"), None);
        assert_eq!(parse_room_id("1"), Some(1));
        assert_eq!(parse_room_id("20"), Some(20));
        assert_eq!(parse_room_id("21"), None);
    }

    #[test]
    fn test_room_id_must_be_numeric() {
        assert_eq!(parse_room_id("lobby"), None);
        assert_eq!(parse_room_id(""), None);
        assert_eq!(parse_room_id("-3"), None);
        assert_eq!(parse_room_id("7abc"), None);
    }
}
