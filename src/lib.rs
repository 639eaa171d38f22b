//! ChatFlow - espone i moduli principali della pipeline di messaggistica
//!
//! La pipeline è composta da tre processi (vedi `src/bin/`):
//! - `server`: edge WebSocket che valida e pubblica sul broker
//! - `consumer`: svuota le code per stanza, fa broadcast sul bus e persiste
//! - `loadtest`: client closed-loop con pool di connessioni e circuit breaker

pub mod bus;
pub mod client;
pub mod consumer;
pub mod core;
pub mod dtos;
pub mod entities;
pub mod queue;
pub mod repositories;
pub mod ws;

// Re-export dei tipi principali per facilitare l'import
pub use self::core::{config::Config, error::QueueError, state::AppState};
