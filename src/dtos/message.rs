//! ChatMessage - payload inbound dal client, con le regole di validazione
//!
//! Ogni regola produce un messaggio d'errore distinto e leggibile, che
//! l'edge rimanda al mittente dentro un `ErrorResponse`.

use chrono::DateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::{Validate, ValidationError, ValidationErrors};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z0-9]{3,20}$").expect("valid username regex"));

/// Messaggio di chat come arriva dal client.
///
/// `message_type` resta una stringa sul filo: la validazione fa il controllo
/// di appartenenza così da poter rispondere VALIDATION_ERROR (e non un
/// errore di parsing) per un tipo sconosciuto.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[validate(range(min = 1, max = 100000, message = "userId must be between 1 and 100000"))]
    pub user_id: i32,

    #[validate(regex(
        path = *USERNAME_RE,
        message = "username must be 3-20 alphanumeric characters"
    ))]
    pub username: String,

    #[validate(length(min = 1, max = 500, message = "message must be 1-500 characters"))]
    pub message: String,

    #[validate(custom(function = validate_timestamp))]
    pub timestamp: String,

    #[validate(custom(function = validate_message_type))]
    pub message_type: String,

    pub room_id: i32,
}

fn validate_timestamp(value: &str) -> Result<(), ValidationError> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(_) => Ok(()),
        Err(_) => {
            let mut err = ValidationError::new("timestamp");
            err.message = Some("timestamp must be valid ISO-8601".into());
            Err(err)
        }
    }
}

fn validate_message_type(value: &str) -> Result<(), ValidationError> {
    match value.parse::<crate::entities::MessageType>() {
        Ok(_) => Ok(()),
        Err(()) => {
            let mut err = ValidationError::new("message_type");
            err.message = Some("messageType must be TEXT, JOIN, or LEAVE".into());
            Err(err)
        }
    }
}

/// Estrae il primo errore in un ordine di campo stabile, così la risposta al
/// client è deterministica anche quando falliscono più regole insieme.
pub fn first_validation_error(errors: &ValidationErrors) -> String {
    const FIELD_ORDER: [&str; 5] = ["user_id", "username", "message", "timestamp", "message_type"];

    let by_field = errors.field_errors();
    for field in FIELD_ORDER {
        if let Some(list) = by_field.get(field) {
            if let Some(first) = list.first() {
                return first
                    .message
                    .clone()
                    .map(|m| m.into_owned())
                    .unwrap_or_else(|| format!("{} is invalid", field));
            }
        }
    }
    "invalid message".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_message() -> ChatMessage {
        ChatMessage {
            user_id: 1,
            username: "abc".to_string(),
            message: "hi".to_string(),
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            message_type: "TEXT".to_string(),
            room_id: 7,
        }
    }

    fn error_for(msg: &ChatMessage) -> Option<String> {
        msg.validate().err().map(|e| first_validation_error(&e))
    }

    #[test]
    fn test_valid_message_passes() {
        assert!(valid_message().validate().is_ok());
    }

    //------------------------------
    // userId boundary
    //------------------------------

    #[test]
    fn test_user_id_boundaries() {
        let mut msg = valid_message();

        msg.user_id = 0;
        assert_eq!(
            error_for(&msg).as_deref(),
            Some("userId must be between 1 and 100000")
        );

        msg.user_id = 1;
        assert!(msg.validate().is_ok());

        msg.user_id = 100_000;
        assert!(msg.validate().is_ok());

        msg.user_id = 100_001;
        assert!(msg.validate().is_err());
    }

    //------------------------------
    // username boundary: 2, 3, 20, 21
    //------------------------------

    #[test]
    fn test_username_boundaries() {
        let mut msg = valid_message();

        msg.username = "ab".to_string();
        assert_eq!(
            error_for(&msg).as_deref(),
            Some("username must be 3-20 alphanumeric characters")
        );

        msg.username = "abc".to_string();
        assert!(msg.validate().is_ok());

        msg.username = "a".repeat(20);
        assert!(msg.validate().is_ok());

        msg.username = "a".repeat(21);
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_username_rejects_non_alphanumeric() {
        let mut msg = valid_message();
        msg.username = "ab cd".to_string();
        assert!(msg.validate().is_err());

        msg.username = "héllo".to_string();
        assert!(msg.validate().is_err());
    }

    //------------------------------
    // message boundary: 0, 1, 500, 501
    //------------------------------

    #[test]
    fn test_message_boundaries() {
        let mut msg = valid_message();

        msg.message = String::new();
        assert_eq!(
            error_for(&msg).as_deref(),
            Some("message must be 1-500 characters")
        );

        msg.message = "x".to_string();
        assert!(msg.validate().is_ok());

        msg.message = "x".repeat(500);
        assert!(msg.validate().is_ok());

        msg.message = "x".repeat(501);
        assert!(msg.validate().is_err());
    }

    //------------------------------
    // timestamp / messageType
    //------------------------------

    #[test]
    fn test_timestamp_must_be_iso8601() {
        let mut msg = valid_message();
        msg.timestamp = "not-a-date".to_string();
        assert_eq!(
            error_for(&msg).as_deref(),
            Some("timestamp must be valid ISO-8601")
        );
    }

    #[test]
    fn test_timestamp_accepts_offset_form() {
        let mut msg = valid_message();
        msg.timestamp = "2025-01-01T12:30:00+02:00".to_string();
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_message_type_membership() {
        let mut msg = valid_message();
        for good in ["TEXT", "JOIN", "LEAVE"] {
            msg.message_type = good.to_string();
            assert!(msg.validate().is_ok());
        }

        msg.message_type = "SHOUT".to_string();
        assert_eq!(
            error_for(&msg).as_deref(),
            Some("messageType must be TEXT, JOIN, or LEAVE")
        );
    }

    //------------------------------
    // wire shape
    //------------------------------

    #[test]
    fn test_wire_fields_are_camel_case() {
        let json = serde_json::to_string(&valid_message()).unwrap();
        assert!(json.contains("\"userId\""));
        assert!(json.contains("\"messageType\""));
        assert!(json.contains("\"roomId\""));
        assert!(!json.contains("user_id"));
    }

    #[test]
    fn test_malformed_json_is_a_parse_failure() {
        // Troncato: deve fallire al parsing, non alla validazione
        assert!(serde_json::from_str::<ChatMessage>("{\"userId\":").is_err());
    }

    #[test]
    fn test_first_error_order_is_stable() {
        let mut msg = valid_message();
        msg.user_id = 0;
        msg.username = "x".to_string();
        // userId viene prima di username nell'ordine dei campi
        assert_eq!(
            error_for(&msg).as_deref(),
            Some("userId must be between 1 and 100000")
        );
    }
}
