//! Integration tests per la classificazione degli errori di ingresso
//!
//! Copre la griglia di casi limite del protocollo: per ogni payload il
//! client deve ricevere la classe giusta (PARSE_ERROR / VALIDATION_ERROR /
//! accettazione) e il messaggio d'errore specifico della regola violata.

use chatflow::dtos::{first_validation_error, ChatMessage};
use validator::Validate;

/// Riproduce la classificazione dell'edge su un frame di testo.
enum Classified {
    ParseError,
    ValidationError(String),
    Accepted,
}

fn classify(frame: &str) -> Classified {
    match serde_json::from_str::<ChatMessage>(frame) {
        Err(_) => Classified::ParseError,
        Ok(msg) => match msg.validate() {
            Err(errors) => Classified::ValidationError(first_validation_error(&errors)),
            Ok(()) => Classified::Accepted,
        },
    }
}

fn frame(user_id: i64, username: &str, message: &str, timestamp: &str, mtype: &str) -> String {
    serde_json::json!({
        "userId": user_id,
        "username": username,
        "message": message,
        "timestamp": timestamp,
        "messageType": mtype,
        "roomId": 7,
    })
    .to_string()
}

#[test]
fn test_malformed_json_is_parse_error() {
    for bad in ["{\"userId\":", "", "not json at all", "[1,2,3"] {
        assert!(matches!(classify(bad), Classified::ParseError), "input: {bad}");
    }
}

#[test]
fn test_username_length_grid() {
    let cases = [(2usize, false), (3, true), (20, true), (21, false)];
    for (len, ok) in cases {
        let username = "u".repeat(len);
        let result = classify(&frame(1, &username, "hi", "2025-01-01T00:00:00Z", "TEXT"));
        match (ok, result) {
            (true, Classified::Accepted) => {}
            (false, Classified::ValidationError(msg)) => {
                assert_eq!(msg, "username must be 3-20 alphanumeric characters");
            }
            _ => panic!("unexpected classification for username length {len}"),
        }
    }
}

#[test]
fn test_message_length_grid() {
    let cases = [(0usize, false), (1, true), (500, true), (501, false)];
    for (len, ok) in cases {
        let body = "m".repeat(len);
        let result = classify(&frame(1, "abc", &body, "2025-01-01T00:00:00Z", "TEXT"));
        match (ok, result) {
            (true, Classified::Accepted) => {}
            (false, Classified::ValidationError(msg)) => {
                assert_eq!(msg, "message must be 1-500 characters");
            }
            _ => panic!("unexpected classification for message length {len}"),
        }
    }
}

#[test]
fn test_user_id_grid() {
    let cases = [(0i64, false), (1, true), (100_000, true), (100_001, false)];
    for (user_id, ok) in cases {
        let result = classify(&frame(user_id, "abc", "hi", "2025-01-01T00:00:00Z", "TEXT"));
        match (ok, result) {
            (true, Classified::Accepted) => {}
            (false, Classified::ValidationError(msg)) => {
                assert_eq!(msg, "userId must be between 1 and 100000");
            }
            _ => panic!("unexpected classification for userId {user_id}"),
        }
    }
}

#[test]
fn test_bad_timestamp_is_validation_error_not_parse_error() {
    let result = classify(&frame(1, "abc", "hi", "not-a-date", "TEXT"));
    match result {
        Classified::ValidationError(msg) => {
            assert_eq!(msg, "timestamp must be valid ISO-8601");
        }
        _ => panic!("expected a validation error"),
    }
}

#[test]
fn test_unknown_message_type_is_validation_error() {
    let result = classify(&frame(1, "abc", "hi", "2025-01-01T00:00:00Z", "SHOUT"));
    match result {
        Classified::ValidationError(msg) => {
            assert_eq!(msg, "messageType must be TEXT, JOIN, or LEAVE");
        }
        _ => panic!("expected a validation error"),
    }
}

#[test]
fn test_well_formed_message_is_accepted() {
    assert!(matches!(
        classify(&frame(1, "abc", "hi", "2025-01-01T00:00:00Z", "TEXT")),
        Classified::Accepted
    ));
}
