//! Envelope di risposta dell'edge: esattamente uno per ogni frame ricevuto

use super::message::ChatMessage;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const PARSE_ERROR: &str = "PARSE_ERROR";
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const QUEUE_ERROR: &str = "QUEUE_ERROR";

/// Risposta positiva: il messaggio è stato accettato dal broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub user_id: i32,
    pub username: String,
    pub message: String,
    pub client_timestamp: String,
    pub message_type: String,
    pub status: String,
    pub server_timestamp: String,
}

impl ChatResponse {
    pub fn accepted(msg: &ChatMessage) -> Self {
        Self {
            user_id: msg.user_id,
            username: msg.username.clone(),
            message: msg.message.clone(),
            client_timestamp: msg.timestamp.clone(),
            message_type: msg.message_type.clone(),
            status: "OK".to_string(),
            server_timestamp: now_iso(),
        }
    }
}

/// Risposta negativa; `error` è uno dei tre codici qui sopra.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            timestamp: now_iso(),
        }
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_envelope_shape() {
        let msg = ChatMessage {
            user_id: 1,
            username: "abc".to_string(),
            message: "hi".to_string(),
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            message_type: "TEXT".to_string(),
            room_id: 7,
        };
        let resp = ChatResponse::accepted(&msg);
        assert_eq!(resp.status, "OK");
        assert_eq!(resp.client_timestamp, "2025-01-01T00:00:00Z");

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"OK\""));
        assert!(json.contains("\"clientTimestamp\""));
        assert!(json.contains("\"serverTimestamp\""));
    }

    #[test]
    fn test_error_envelope_shape() {
        let resp = ErrorResponse::new(PARSE_ERROR, "Invalid JSON format");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"error\":\"PARSE_ERROR\""));
        assert!(json.contains("\"message\":\"Invalid JSON format\""));
        assert!(json.contains("\"timestamp\""));
    }
}
