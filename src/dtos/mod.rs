//! DTOs - Payload di filo scambiati con client, broker e bus
//!
//! Tutti i campi JSON sono camelCase, come il resto del protocollo.

pub mod envelope;
pub mod message;
pub mod queued;

pub use envelope::{ChatResponse, ErrorResponse, PARSE_ERROR, QUEUE_ERROR, VALIDATION_ERROR};
pub use message::{first_validation_error, ChatMessage};
pub use queued::{BroadcastMessage, QueuedMessage};
