//! Queue Fabric - topologia sul broker e pubblicazione per stanza

pub mod publisher;
pub mod topology;

pub use publisher::RoomPublisher;
pub use topology::{declare_exchanges, declare_room_queue, room_queue_name, ROOM_COUNT};

use crate::core::config::BrokerConfig;
use lapin::{Channel, Connection, ConnectionProperties};
use tracing::info;

/// Connessione condivisa al broker; i canali sono sempre per-task, mai
/// condivisi tra task.
pub struct Broker {
    connection: Connection,
}

impl Broker {
    pub async fn connect(config: &BrokerConfig, name: &str) -> Result<Self, lapin::Error> {
        let properties = ConnectionProperties::default().with_connection_name(name.into());
        let connection = Connection::connect(&config.uri(), properties).await?;
        info!(host = %config.host, port = config.port, name, "broker connection established");
        Ok(Self { connection })
    }

    pub async fn create_channel(&self) -> Result<Channel, lapin::Error> {
        self.connection.create_channel().await
    }

    pub async fn close(&self) {
        if let Err(e) = self.connection.close(200, "shutdown").await {
            tracing::warn!(error = %e, "error closing broker connection");
        } else {
            info!("broker connection closed");
        }
    }
}
