//! Consumer: drena le code per stanza, fa broadcast sul bus e persiste a
//! batch sullo storage.

use chatflow::consumer::ConsumerApp;
use chatflow::core::{init_tracing, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::from_env()?;
    config.print_info();

    let app = ConsumerApp::start(config).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    app.shutdown().await;
    Ok(())
}
