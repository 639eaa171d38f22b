//! Gestione errori - un tipo per sottosistema, propagati con `?`

use std::fmt;

/// Errori del percorso di pubblicazione verso il broker.
///
/// Qualunque variante, vista dall'edge, si traduce in un `QUEUE_ERROR` verso
/// il client: il messaggio non viene trattenuto da nessuna parte.
#[derive(Debug)]
pub enum QueueError {
    Serialize(serde_json::Error),
    Broker(lapin::Error),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Serialize(e) => write!(f, "failed to serialize message: {}", e),
            QueueError::Broker(e) => write!(f, "broker publish failed: {}", e),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialize(err)
    }
}

impl From<lapin::Error> for QueueError {
    fn from(err: lapin::Error) -> Self {
        QueueError::Broker(err)
    }
}

/// Errori del processo consumer (broker o storage).
#[derive(Debug)]
pub enum ConsumerError {
    Broker(lapin::Error),
    Db(sqlx::Error),
}

impl fmt::Display for ConsumerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerError::Broker(e) => write!(f, "broker error: {}", e),
            ConsumerError::Db(e) => write!(f, "database error: {}", e),
        }
    }
}

impl std::error::Error for ConsumerError {}

impl From<lapin::Error> for ConsumerError {
    fn from(err: lapin::Error) -> Self {
        ConsumerError::Broker(err)
    }
}

impl From<sqlx::Error> for ConsumerError {
    fn from(err: sqlx::Error) -> Self {
        ConsumerError::Db(err)
    }
}

/// Errori lato load client.
#[derive(Debug)]
pub enum ClientError {
    /// Handshake non completato entro la deadline.
    ConnectTimeout,
    Connect(tokio_tungstenite::tungstenite::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::ConnectTimeout => write!(f, "connection handshake timed out"),
            ClientError::Connect(e) => write!(f, "connection failed: {}", e),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Connect(err)
    }
}
