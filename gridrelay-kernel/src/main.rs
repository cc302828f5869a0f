/**
 * GRIDRELAY KERNEL - Point d'entrée du service de relais
 *
 * RÔLE : Bootstrap complet : config, passerelle ledger, relais, sonde de
 * connectivité, santé systémique, MQTT optionnel, API HTTP.
 *
 * Une configuration incomplète arrête le démarrage avant qu'aucun composant
 * ne soit lancé.
 */

use std::sync::Arc;

use anyhow::Context;
use gridrelay_kernel::config::RelayConfig;
use gridrelay_kernel::connectivity::ConnectivityMonitor;
use gridrelay_kernel::health::HealthAggregator;
use gridrelay_kernel::http::{build_router, AppState};
use gridrelay_kernel::publisher::{spawn_health_refresher, spawn_mqtt_publisher, HealthBoard};
use gridrelay_kernel::relay::TransactionRelay;
use gridrelay_kernel::tracker::{TxTracker, DEFAULT_CAPACITY};
use gridrelay_kernel::logging;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let log_format = logging::init();

    let cfg = Arc::new(RelayConfig::load().await.context("invalid gridrelay configuration")?);
    info!(?log_format, listen = %cfg.listen_addr, "gridrelay kernel starting");

    let gateway = gridrelay_gateway::connect(
        &cfg.rpc_url,
        cfg.contract_address,
        cfg.signer_key.expose(),
        cfg.deploy_block,
    )
    .context("failed to build ledger gateway")?;
    info!(
        relayer = %gateway.signer_address(),
        contract = %cfg.contract_address,
        rpc = %cfg.rpc_url,
        "relayer identity loaded"
    );

    let tracker = TxTracker::new(DEFAULT_CAPACITY);
    let connectivity = ConnectivityMonitor::new(cfg.stale_after);
    let relay = Arc::new(TransactionRelay::new(
        gateway.clone(),
        connectivity.clone(),
        tracker.clone(),
        cfg.retry,
        cfg.fees,
        cfg.confirmation,
    ));

    // tâches de fond
    connectivity.spawn_probe_loop(gateway.clone(), cfg.probe_interval);

    let board = HealthBoard::new();
    let aggregator = Arc::new(HealthAggregator::new(
        gateway.clone(),
        connectivity.clone(),
        cfg.recent_proposals,
        cfg.proposal_scan_limit,
    ));
    spawn_health_refresher(aggregator, board.clone(), cfg.health_refresh);

    match &cfg.mqtt {
        Some(mqtt) => {
            info!(host = %mqtt.host, port = mqtt.port, "mqtt health publishing enabled");
            spawn_mqtt_publisher(
                mqtt.clone(),
                board.clone(),
                connectivity.clone(),
                tracker.clone(),
                cfg.health_refresh,
            );
        }
        None => info!("mqtt not configured, health available over http only"),
    }

    let app = build_router(AppState { relay, tracker, connectivity, board });

    let listener = TcpListener::bind(cfg.listen_addr)
        .await
        .with_context(|| format!("cannot bind {}", cfg.listen_addr))?;
    info!(addr = %cfg.listen_addr, "http api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    info!("gridrelay kernel stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
