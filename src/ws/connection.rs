//! WebSocket Connection Management - Gestione connessioni sull'edge
//!
//! Ogni connessione viene divisa in due task: lettura (parse, validazione,
//! pubblicazione sul broker, envelope di risposta) e scrittura (unico
//! proprietario del sink, svuota il canale outbound dove arrivano sia le
//! risposte sia i broadcast del bus).

use crate::core::state::AppState;
use crate::dtos::{
    first_validation_error, ChatMessage, ChatResponse, ErrorResponse, QueuedMessage, PARSE_ERROR,
    QUEUE_ERROR, VALIDATION_ERROR,
};
use crate::queue::RoomPublisher;
use crate::ws::roommap::{ConnId, Outbound};
use crate::ws::INVALID_ROOM_CODE;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{info, instrument, warn};
use validator::Validate;

#[instrument(skip(socket, state))]
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, room_id: i32) {
    let (ws_tx, ws_rx) = socket.split();

    // Canale interno: il task di lettura e il bridge del bus scrivono qui,
    // il task di scrittura svuota verso il socket
    let (out_tx, out_rx) = unbounded_channel::<Outbound>();

    let conn_id = state.rooms.register(room_id, out_tx.clone());

    tokio::spawn(write_ws(conn_id, ws_tx, out_rx));
    tokio::spawn(listen_ws(conn_id, room_id, ws_rx, out_tx, state));
}

/// Task di scrittura: svuota il canale outbound verso il socket.
#[instrument(skip(ws_tx, out_rx))]
pub async fn write_ws(
    conn_id: ConnId,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut out_rx: UnboundedReceiver<Outbound>,
) {
    while let Some(frame) = out_rx.recv().await {
        match frame {
            Outbound::Reply(json) => {
                if ws_tx.send(Message::Text(Utf8Bytes::from(json))).await.is_err() {
                    break;
                }
            }
            Outbound::Broadcast(payload) => {
                // payload grezzo dal bus, inoltrato senza ri-serializzare
                if ws_tx
                    .send(Message::Text(Utf8Bytes::from(payload.as_ref())))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Outbound::Close { code, reason } => {
                let _ = ws_tx
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: Utf8Bytes::from(reason),
                    })))
                    .await;
                break;
            }
            Outbound::Shutdown => break,
        }
    }
}

/// Task di lettura: un envelope di risposta per ogni frame di testo.
#[instrument(skip(ws_rx, out_tx, state), fields(conn_id, room_id))]
pub async fn listen_ws(
    conn_id: ConnId,
    room_id: i32,
    mut ws_rx: SplitStream<WebSocket>,
    out_tx: UnboundedSender<Outbound>,
    state: Arc<AppState>,
) {
    // Publisher confinato a questo task: canale proprio, mai condiviso
    let mut publisher = RoomPublisher::new(state.broker.clone(), state.counters.clone());

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "WebSocket error");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if handle_inbound(text.as_str(), room_id, &mut publisher, &out_tx)
                    .await
                    .is_break()
                {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.rooms.unregister(conn_id);
    let _ = out_tx.send(Outbound::Shutdown);
    info!("listen task terminated");
}

/// Pipeline di un singolo frame: parse -> stanza -> validazione -> broker.
/// `Break` significa che la connessione va chiusa.
async fn handle_inbound(
    text: &str,
    room_id: i32,
    publisher: &mut RoomPublisher,
    out_tx: &UnboundedSender<Outbound>,
) -> ControlFlow<()> {
    let chat: ChatMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(_) => {
            send_json(out_tx, &ErrorResponse::new(PARSE_ERROR, "Invalid JSON format"));
            return ControlFlow::Continue(());
        }
    };

    // La stanza della connessione è autoritativa: un payload che dichiara
    // una stanza diversa chiude il socket come un path non valido
    if chat.room_id != room_id {
        warn!(claimed = chat.room_id, room_id, "room mismatch, closing connection");
        let _ = out_tx.send(Outbound::Close {
            code: INVALID_ROOM_CODE,
            reason: "Invalid room ID",
        });
        return ControlFlow::Break(());
    }

    if let Err(errors) = chat.validate() {
        send_json(
            out_tx,
            &ErrorResponse::new(VALIDATION_ERROR, first_validation_error(&errors)),
        );
        return ControlFlow::Continue(());
    }

    let queued = QueuedMessage::new(chat, room_id);
    match publisher.publish(&queued).await {
        Ok(()) => {
            // La durabilità precede l'ACK: l'envelope OK parte solo dopo
            // che il broker ha accettato il messaggio
            send_json(out_tx, &ChatResponse::accepted(&queued.chat_message));
        }
        Err(e) => {
            warn!(error = %e, "failed to queue message");
            send_json(
                out_tx,
                &ErrorResponse::new(QUEUE_ERROR, "Failed to queue message"),
            );
        }
    }

    ControlFlow::Continue(())
}

fn send_json<T: Serialize>(out_tx: &UnboundedSender<Outbound>, body: &T) {
    match serde_json::to_string(body) {
        Ok(json) => {
            let _ = out_tx.send(Outbound::Reply(json));
        }
        Err(e) => warn!(error = %e, "failed to serialize response envelope"),
    }
}
