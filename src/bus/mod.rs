//! Bus Module - Pub/sub per il broadcast a bassa latenza
//!
//! Il canale di una stanza è `chatroom:{roomId}`; il bridge dell'edge si
//! sottoscrive al pattern `chatroom:*`. Il bus non è durevole: trasporta
//! solo `BroadcastMessage` serializzati.

pub mod publisher;
pub mod subscriber;

pub use publisher::{BusPublisher, BusPublisherHandle};
pub use subscriber::run_subscriber;

pub const CHANNEL_PREFIX: &str = "chatroom:";
pub const CHANNEL_PATTERN: &str = "chatroom:*";

pub fn channel_for(room_id: i32) -> String {
    format!("{}{}", CHANNEL_PREFIX, room_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        assert_eq!(channel_for(7), "chatroom:7");
        assert!(channel_for(20).starts_with(CHANNEL_PREFIX));
    }
}
