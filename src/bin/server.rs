//! Edge server: accetta i socket dei client, valida, pubblica sul broker e
//! fa da bridge per i broadcast del bus.

use axum::routing::any;
use axum::Router;
use chatflow::bus::run_subscriber;
use chatflow::core::{init_tracing, Config};
use chatflow::queue::{declare_exchanges, Broker};
use chatflow::ws::ws_handler;
use chatflow::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::info;

const SOCKET_CLOSE_BUDGET: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::from_env()?;
    config.print_info();

    let broker = Broker::connect(&config.broker, "chatflow-server").await?;

    // exchange e DLQ esistono prima della prima pubblicazione
    let setup = broker.create_channel().await?;
    declare_exchanges(&setup).await?;
    drop(setup);

    let state = Arc::new(AppState::new(broker));

    // bridge del bus: handle in sola lettura sulla room map
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bridge = tokio::spawn(run_subscriber(
        config.bus.clone(),
        state.rooms.clone(),
        shutdown_rx,
    ));

    let app = Router::new()
        .route("/chat/{room_id}", any(ws_handler))
        .with_state(state.clone());

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        "edge server listening"
    );

    tokio::select! {
        result = async { axum::serve(listener, app).await } => result?,
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    // stop accept -> chiudi i socket -> ferma il bridge -> chiudi il broker
    state.rooms.shutdown_all();
    sleep(SOCKET_CLOSE_BUDGET).await;

    let _ = shutdown_tx.send(true);
    if timeout(SOCKET_CLOSE_BUDGET, bridge).await.is_err() {
        tracing::warn!("bus bridge did not stop within budget");
    }

    state.broker.close().await;
    info!(
        published = state.counters.published_count(),
        failed = state.counters.failed_count(),
        "edge server stopped"
    );

    Ok(())
}
