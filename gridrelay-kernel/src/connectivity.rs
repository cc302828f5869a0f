/**
 * CONNECTIVITÉ LEDGER - Machine d'états HEALTHY / DEGRADED / CRITICAL
 *
 * RÔLE :
 * Suit la joignabilité du nœud RPC à partir de deux sources : la sonde
 * périodique (numéro de bloc) et le résultat de chaque tentative d'écriture.
 *
 * FONCTIONNEMENT :
 * - Succès → HEALTHY, compteur d'échecs remis à zéro, horodatage mémorisé
 * - 1 à 2 échecs consécutifs → DEGRADED ; 3 et plus → CRITICAL
 * - Aucun succès depuis `stale_after` → CRITICAL, même sans échec compté
 * - État initial CRITICAL jusqu'au premier succès
 * - Les sondes alimentent le ratio d'uptime exposé à l'agrégateur de santé
 *
 * UTILITÉ :
 * 🎯 Dashboard : statut réseau sans interroger le nœud à chaque requête
 * 🎯 Santé systémique : uptime réel et override du pulse en CRITICAL
 */

use std::sync::Arc;
use std::time::Duration;

use gridrelay_gateway::ContractGateway;
use parking_lot::Mutex;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const DEGRADED_AFTER: u32 = 1;
const CRITICAL_AFTER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityLevel {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivitySnapshot {
    pub level: ConnectivityLevel,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub last_success_at: Option<String>,
    pub seconds_since_success: Option<u64>,
    pub last_block: Option<u64>,
    pub probes_total: u64,
    pub probes_ok: u64,
    /// Ratio de sondes réussies (0 avant la première sonde)
    pub uptime_percent: f64,
}

struct ConnState {
    last_success: Option<Instant>,
    last_success_wall: Option<OffsetDateTime>,
    consecutive_failures: u32,
    last_block: Option<u64>,
    probes_total: u64,
    probes_ok: u64,
    last_level: ConnectivityLevel,
}

#[derive(Clone)]
pub struct ConnectivityMonitor {
    state: Arc<Mutex<ConnState>>,
    stale_after: Duration,
}

impl ConnectivityMonitor {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnState {
                last_success: None,
                last_success_wall: None,
                consecutive_failures: 0,
                last_block: None,
                probes_total: 0,
                probes_ok: 0,
                last_level: ConnectivityLevel::Critical,
            })),
            stale_after,
        }
    }

    /// Le nœud a répondu
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.last_success = Some(Instant::now());
        state.last_success_wall = Some(OffsetDateTime::now_utc());
        state.consecutive_failures = 0;
        self.note_transition(&mut state);
    }

    /// Le nœud n'a pas pu être joint
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        self.note_transition(&mut state);
    }

    pub fn level(&self) -> ConnectivityLevel {
        let state = self.state.lock();
        self.level_at(&state, Instant::now())
    }

    pub fn snapshot(&self) -> ConnectivitySnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> ConnectivitySnapshot {
        let state = self.state.lock();
        let level = self.level_at(&state, now);
        let uptime_percent = if state.probes_total == 0 {
            0.0
        } else {
            state.probes_ok as f64 / state.probes_total as f64 * 100.0
        };
        ConnectivitySnapshot {
            level,
            healthy: level == ConnectivityLevel::Healthy,
            consecutive_failures: state.consecutive_failures,
            last_success_at: state
                .last_success_wall
                .and_then(|t| t.format(&Rfc3339).ok()),
            seconds_since_success: state
                .last_success
                .map(|t| now.saturating_duration_since(t).as_secs()),
            last_block: state.last_block,
            probes_total: state.probes_total,
            probes_ok: state.probes_ok,
            uptime_percent,
        }
    }

    fn level_at(&self, state: &ConnState, now: Instant) -> ConnectivityLevel {
        let Some(last) = state.last_success else {
            return ConnectivityLevel::Critical;
        };
        if now.saturating_duration_since(last) > self.stale_after {
            return ConnectivityLevel::Critical;
        }
        match state.consecutive_failures {
            f if f >= CRITICAL_AFTER => ConnectivityLevel::Critical,
            f if f >= DEGRADED_AFTER => ConnectivityLevel::Degraded,
            _ => ConnectivityLevel::Healthy,
        }
    }

    fn note_transition(&self, state: &mut ConnState) {
        let level = self.level_at(state, Instant::now());
        if level == state.last_level {
            return;
        }
        match level {
            ConnectivityLevel::Healthy => info!(from = ?state.last_level, "ledger connectivity healthy"),
            _ => warn!(
                from = ?state.last_level,
                to = ?level,
                consecutive_failures = state.consecutive_failures,
                "ledger connectivity changed"
            ),
        }
        state.last_level = level;
    }

    /// Sonde le nœud via le numéro de bloc
    pub async fn probe(&self, gateway: &dyn ContractGateway) -> ConnectivityLevel {
        let result = gateway.block_number().await;
        {
            let mut state = self.state.lock();
            state.probes_total += 1;
            if let Ok(block) = &result {
                state.probes_ok += 1;
                state.last_block = Some(*block);
            }
        }
        match result {
            Ok(block) => {
                debug!(block, "ledger probe ok");
                self.record_success();
            }
            Err(e) => {
                warn!(error = %e, "ledger probe failed");
                self.record_failure();
            }
        }
        self.level()
    }

    /// Démarre la sonde périodique ; le premier tick est immédiat
    pub fn spawn_probe_loop(&self, gateway: Arc<dyn ContractGateway>, every: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                monitor.probe(gateway.as_ref()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridrelay_devkit::MockGateway;
    use gridrelay_gateway::GatewayError;

    fn monitor() -> ConnectivityMonitor {
        ConnectivityMonitor::new(Duration::from_secs(120))
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_critical_then_healthy_after_success() {
        let m = monitor();
        assert_eq!(m.level(), ConnectivityLevel::Critical);
        assert_eq!(m.snapshot().uptime_percent, 0.0);

        m.record_success();
        assert_eq!(m.level(), ConnectivityLevel::Healthy);
        assert!(m.snapshot().healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_thresholds() {
        let m = monitor();
        m.record_success();

        m.record_failure();
        assert_eq!(m.level(), ConnectivityLevel::Degraded);
        m.record_failure();
        assert_eq!(m.level(), ConnectivityLevel::Degraded);
        m.record_failure();
        assert_eq!(m.level(), ConnectivityLevel::Critical);

        m.record_success();
        assert_eq!(m.level(), ConnectivityLevel::Healthy);
        assert_eq!(m.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_critical_from_any_state() {
        let fresh = monitor();
        for _ in 0..3 {
            fresh.record_failure();
        }
        assert_eq!(fresh.level(), ConnectivityLevel::Critical);

        let degraded = monitor();
        degraded.record_success();
        degraded.record_failure();
        for _ in 0..3 {
            degraded.record_failure();
        }
        assert_eq!(degraded.level(), ConnectivityLevel::Critical);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_success_is_critical() {
        let m = monitor();
        m.record_success();
        tokio::time::advance(Duration::from_secs(121)).await;
        assert_eq!(m.level(), ConnectivityLevel::Critical);
        assert_eq!(m.snapshot().seconds_since_success, Some(121));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_counts_uptime() {
        let mock = MockGateway::new();
        mock.script_probes([Ok(7), Err(GatewayError::Transport("connection refused".into()))]);
        let m = monitor();

        assert_eq!(m.probe(&mock).await, ConnectivityLevel::Healthy);
        assert_eq!(m.probe(&mock).await, ConnectivityLevel::Degraded);
        assert_eq!(m.probe(&mock).await, ConnectivityLevel::Healthy);

        let snap = m.snapshot();
        assert_eq!(snap.probes_total, 3);
        assert_eq!(snap.probes_ok, 2);
        assert_eq!(snap.last_block, Some(1_000));
        assert!((snap.uptime_percent - 66.666).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_loop_runs_on_interval() {
        let mock = Arc::new(MockGateway::new());
        let m = monitor();
        let handle = m.spawn_probe_loop(mock.clone(), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(61)).await;
        handle.abort();

        assert_eq!(mock.probe_calls(), 3);
        assert_eq!(m.level(), ConnectivityLevel::Healthy);
    }
}
