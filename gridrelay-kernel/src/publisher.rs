/**
 * PUBLICATION DE LA SANTÉ - Tableau de bord en mémoire + diffusion MQTT
 *
 * RÔLE :
 * Garde le dernier rapport de santé calculé et le diffuse.
 *
 * FONCTIONNEMENT :
 * - `HealthBoard` : dernier rapport valide, horodatage, erreur éventuelle.
 *   Un calcul raté ne l'efface pas : il est conservé et marqué `stale`
 * - `spawn_health_refresher` : recalcul périodique (tokio interval)
 * - `spawn_mqtt_publisher` : si MQTT est configuré, publie l'état complet
 *   sur `gridrelay/system/health@v1` et compte les reconnexions broker
 */

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, ClientError, MqttOptions, QoS};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::MqttConf;
use crate::connectivity::{ConnectivityMonitor, ConnectivitySnapshot};
use crate::health::{HealthAggregator, HealthError, HealthReport};
use crate::tracker::{TrackerStats, TxTracker};

pub const HEALTH_TOPIC: &str = "gridrelay/system/health@v1";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize health payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("mqtt publish failed: {0}")]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthView {
    pub report: Option<HealthReport>,
    pub computed_at: Option<String>,
    pub stale: bool,
    pub last_error: Option<String>,
    pub refreshes: u64,
    pub failures: u64,
}

#[derive(Default)]
struct BoardState {
    report: Option<HealthReport>,
    computed_at: Option<String>,
    stale: bool,
    last_error: Option<String>,
    refreshes: u64,
    failures: u64,
}

#[derive(Clone)]
pub struct HealthBoard {
    state: Arc<Mutex<BoardState>>,
    mqtt_status: Arc<Mutex<String>>,
    mqtt_reconnects: Arc<AtomicU32>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BoardState::default())),
            mqtt_status: Arc::new(Mutex::new("disabled".to_string())),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn record_success(&self, report: HealthReport) {
        let mut state = self.state.lock();
        state.report = Some(report);
        state.computed_at = OffsetDateTime::now_utc().format(&Rfc3339).ok();
        state.stale = false;
        state.last_error = None;
        state.refreshes += 1;
    }

    /// Conserve le dernier rapport, marqué périmé
    pub fn record_failure(&self, err: &HealthError) {
        let mut state = self.state.lock();
        state.stale = true;
        state.last_error = Some(err.to_string());
        state.failures += 1;
    }

    pub fn view(&self) -> HealthView {
        let state = self.state.lock();
        HealthView {
            report: state.report.clone(),
            computed_at: state.computed_at.clone(),
            stale: state.stale,
            last_error: state.last_error.clone(),
            refreshes: state.refreshes,
            failures: state.failures,
        }
    }

    pub fn set_mqtt_status(&self, status: &str) {
        *self.mqtt_status.lock() = status.to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn mqtt_status(&self) -> String {
        self.mqtt_status.lock().clone()
    }

    pub fn mqtt_reconnects(&self) -> u32 {
        self.mqtt_reconnects.load(Ordering::Relaxed)
    }

    /// Recalcule et enregistre le rapport une fois
    pub async fn refresh(&self, aggregator: &HealthAggregator) {
        match aggregator.compute().await {
            Ok(report) => {
                debug!(score = report.pulse.score, status = ?report.pulse.status, "system health refreshed");
                self.record_success(report);
            }
            Err(e) => {
                warn!(error = %e, "system health refresh failed, keeping previous snapshot");
                self.record_failure(&e);
            }
        }
    }
}

impl Default for HealthBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// État complet exposé par `/system/health` et publié sur MQTT
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    #[serde(flatten)]
    pub health: HealthView,
    pub connectivity: ConnectivitySnapshot,
    pub transactions: TrackerStats,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

pub fn system_status(board: &HealthBoard, connectivity: &ConnectivityMonitor, tracker: &TxTracker) -> SystemStatus {
    SystemStatus {
        health: board.view(),
        connectivity: connectivity.snapshot(),
        transactions: tracker.stats(),
        mqtt_status: board.mqtt_status(),
        mqtt_reconnects: board.mqtt_reconnects(),
    }
}

pub fn encode_status(status: &SystemStatus) -> Result<Vec<u8>, PublishError> {
    Ok(serde_json::to_vec(status)?)
}

/// Recalcule la santé toutes les `every` ; le premier calcul est immédiat
pub fn spawn_health_refresher(
    aggregator: Arc<HealthAggregator>,
    board: HealthBoard,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            board.refresh(&aggregator).await;
        }
    })
}

/// Dépose le message sans attendre : file pleine (broker absent) → erreur immédiate,
/// la boucle d'événements MQTT continue d'être pilotée
fn publish_once(
    client: &AsyncClient,
    board: &HealthBoard,
    connectivity: &ConnectivityMonitor,
    tracker: &TxTracker,
) -> Result<(), PublishError> {
    let payload = encode_status(&system_status(board, connectivity, tracker))?;
    client.try_publish(HEALTH_TOPIC, QoS::AtLeastOnce, false, payload)?;
    Ok(())
}

/// Publie l'état système sur MQTT à intervalle fixe
pub fn spawn_mqtt_publisher(
    conf: MqttConf,
    board: HealthBoard,
    connectivity: ConnectivityMonitor,
    tracker: TxTracker,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut opts = MqttOptions::new("gridrelay-kernel-health", &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        board.set_mqtt_status("connecting");

        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match publish_once(&client, &board, &connectivity, &tracker) {
                        Ok(()) => debug!(topic = HEALTH_TOPIC, "published system health"),
                        Err(e) => error!(error = %e, "failed to publish system health"),
                    }
                },
                event = eventloop.poll() => {
                    match event {
                        Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                            info!(host = %conf.host, port = conf.port, "mqtt connected");
                            board.set_mqtt_status("connected");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "mqtt connection error");
                            board.increment_reconnects();
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridrelay_devkit::{addr, MemberBuilder, MockGateway};
    use gridrelay_gateway::GatewayError;

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_stale_snapshot() {
        let mock = Arc::new(MockGateway::new().with_member(addr(1), MemberBuilder::registered()));
        let connectivity = ConnectivityMonitor::new(Duration::from_secs(120));
        let aggregator = HealthAggregator::new(mock.clone(), connectivity, 5, 500);
        let board = HealthBoard::new();

        board.refresh(&aggregator).await;
        let first = board.view();
        assert!(first.report.is_some());
        assert!(!first.stale);

        mock.fail_reads(Some(GatewayError::Transport("connection refused".into())));
        board.refresh(&aggregator).await;

        let view = board.view();
        assert!(view.stale);
        assert_eq!(view.report, first.report);
        assert_eq!(view.computed_at, first.computed_at);
        assert!(view.last_error.unwrap().contains("system stats"));
        assert_eq!((view.refreshes, view.failures), (1, 1));

        mock.fail_reads(None);
        board.refresh(&aggregator).await;
        let recovered = board.view();
        assert!(!recovered.stale);
        assert!(recovered.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresher_runs_periodically() {
        let mock = Arc::new(MockGateway::new());
        let aggregator = Arc::new(HealthAggregator::new(
            mock.clone(),
            ConnectivityMonitor::new(Duration::from_secs(120)),
            5,
            500,
        ));
        let board = HealthBoard::new();
        let handle = spawn_health_refresher(aggregator, board.clone(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(121)).await;
        handle.abort();

        assert_eq!(board.view().refreshes, 3);
    }

    #[tokio::test]
    async fn test_mqtt_publisher_keeps_polling_while_broker_is_down() {
        let board = HealthBoard::new();
        let handle = spawn_mqtt_publisher(
            MqttConf { host: "127.0.0.1".into(), port: 1 },
            board.clone(),
            ConnectivityMonitor::new(Duration::from_secs(120)),
            TxTracker::default(),
            Duration::from_millis(20),
        );

        // 2 s de pause après chaque échec : au moins deux tentatives en 4,5 s
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        handle.abort();

        assert!(board.mqtt_reconnects() >= 2, "reconnects = {}", board.mqtt_reconnects());
        assert_eq!(board.mqtt_status(), "reconnecting");
    }

    #[tokio::test]
    async fn test_status_payload_shape() {
        let board = HealthBoard::new();
        board.increment_reconnects();
        let status = system_status(
            &board,
            &ConnectivityMonitor::new(Duration::from_secs(120)),
            &TxTracker::default(),
        );
        let json: serde_json::Value = serde_json::from_slice(&encode_status(&status).unwrap()).unwrap();

        assert!(json["report"].is_null());
        assert_eq!(json["stale"], false);
        assert_eq!(json["connectivity"]["level"], "CRITICAL");
        assert_eq!(json["transactions"]["submitted"], 0);
        assert_eq!(json["mqttStatus"], "reconnecting");
        assert_eq!(json["mqttReconnects"], 1);
        assert!(json["computedAt"].is_null());
        assert!(json.get("mqtt_status").is_none());
    }
}
