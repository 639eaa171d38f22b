//! Entities - Record persistiti e tipi enumerati

pub mod enums;
pub mod message;

pub use enums::MessageType;
pub use message::{MessageRate, MessageRecord, RoomParticipation, RoomStats, UserStats};
