//! Load client: genera traffico closed-loop contro l'edge e riporta le
//! metriche di latenza e throughput.

use chatflow::client::LoadClient;
use chatflow::core::config::ClientSettings;
use chatflow::core::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = ClientSettings::from_env()?;
    LoadClient::new(settings).run().await;

    Ok(())
}
