/**
 * SUIVI DES TRANSACTIONS - Confirmation en arrière-plan et lookup par hash
 *
 * RÔLE :
 * Garde une trace de chaque soumission (hash, opération, acteur, request id)
 * et de son statut, pour que l'endpoint de relais puisse répondre sans
 * attendre l'inclusion puis exposer le résultat plus tard.
 *
 * FONCTIONNEMENT :
 * - `track` enregistre la soumission en `pending` dès que le hash est connu
 * - `spawn_confirmation` lance une tâche tokio qui interroge le receipt
 *   jusqu'à inclusion ou expiration du délai
 * - Historique borné : au-delà de la capacité, les plus anciennes entrées
 *   terminées sont évincées (les `pending` restent)
 *
 * Une tâche de confirmation ne touche jamais à la transaction elle-même :
 * abandonner l'attente n'annule rien côté chaîne.
 */

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use gridrelay_gateway::{Address, ContractGateway, TxHash, TxReceipt};
use parking_lot::Mutex;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(120), poll_interval: Duration::from_secs(2) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed { block_number: Option<u64>, gas_used: u64 },
    Reverted { block_number: Option<u64>, reason: String },
    /// Receipt jamais observé avant l'expiration du délai
    Unknown { reason: String },
}

impl TxStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }

    /// Statut déduit du receipt (ou de son absence après le délai)
    pub fn from_receipt(receipt: Option<&TxReceipt>, policy: &ConfirmationPolicy) -> Self {
        match receipt {
            Some(r) if r.success => TxStatus::Confirmed { block_number: r.block_number, gas_used: r.gas_used },
            Some(r) => TxStatus::Reverted {
                block_number: r.block_number,
                reason: "execution reverted".to_string(),
            },
            None => TxStatus::Unknown {
                reason: format!("no receipt after {}s", policy.timeout.as_secs()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedTx {
    pub tx_hash: TxHash,
    pub operation: &'static str,
    pub actor: Address,
    pub request_id: Uuid,
    pub submitted_at: String,
    pub updated_at: String,
    pub status: TxStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub submitted: u64,
    pub pending: u64,
    pub confirmed: u64,
    pub reverted: u64,
    pub unknown: u64,
}

struct TrackerInner {
    entries: HashMap<TxHash, TrackedTx>,
    order: VecDeque<TxHash>,
    capacity: usize,
    stats: TrackerStats,
}

#[derive(Clone)]
pub struct TxTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

impl TxTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackerInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
                stats: TrackerStats::default(),
            })),
        }
    }

    /// Enregistre une soumission en `pending` ; un hash déjà suivi garde son entrée
    pub fn track(&self, tx_hash: TxHash, operation: &'static str, actor: Address, request_id: Uuid) {
        let now = now_rfc3339();
        let mut inner = self.inner.lock();
        match inner.entries.entry(tx_hash) {
            Entry::Occupied(existing) => {
                debug!(tx_hash = %tx_hash, status = ?existing.get().status, "transaction already tracked");
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(TrackedTx {
                    tx_hash,
                    operation,
                    actor,
                    request_id,
                    submitted_at: now.clone(),
                    updated_at: now,
                    status: TxStatus::Pending,
                });
            }
        }
        inner.order.push_back(tx_hash);
        inner.stats.submitted += 1;
        inner.stats.pending += 1;
        evict(&mut inner);
    }

    /// Passe une entrée `pending` à son statut final ; sans effet sinon
    pub fn resolve(&self, tx_hash: TxHash, status: TxStatus) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get_mut(&tx_hash) else {
            return;
        };
        if entry.status.is_final() || !status.is_final() {
            return;
        }
        entry.status = status.clone();
        entry.updated_at = now_rfc3339();

        inner.stats.pending = inner.stats.pending.saturating_sub(1);
        match status {
            TxStatus::Confirmed { .. } => inner.stats.confirmed += 1,
            TxStatus::Reverted { .. } => inner.stats.reverted += 1,
            TxStatus::Unknown { .. } => inner.stats.unknown += 1,
            TxStatus::Pending => {}
        }
        evict(&mut inner);
    }

    pub fn get(&self, tx_hash: &TxHash) -> Option<TrackedTx> {
        self.inner.lock().entries.get(tx_hash).cloned()
    }

    pub fn stats(&self) -> TrackerStats {
        self.inner.lock().stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Attend le receipt en tâche de fond puis résout l'entrée
    pub fn spawn_confirmation(
        &self,
        gateway: Arc<dyn ContractGateway>,
        tx_hash: TxHash,
        policy: ConfirmationPolicy,
    ) -> JoinHandle<TxStatus> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let receipt = wait_for_receipt(gateway.as_ref(), tx_hash, &policy).await;
            let status = TxStatus::from_receipt(receipt.as_ref(), &policy);
            match &status {
                TxStatus::Confirmed { block_number, .. } => {
                    info!(tx_hash = %tx_hash, block_number = ?block_number, "transaction confirmed")
                }
                TxStatus::Reverted { block_number, .. } => {
                    warn!(tx_hash = %tx_hash, block_number = ?block_number, "transaction reverted")
                }
                TxStatus::Unknown { reason } => warn!(tx_hash = %tx_hash, %reason, "confirmation abandoned"),
                TxStatus::Pending => {}
            }
            tracker.resolve(tx_hash, status.clone());
            status
        })
    }
}

impl Default for TxTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn evict(inner: &mut TrackerInner) {
    while inner.entries.len() > inner.capacity {
        let finished = inner.order.iter().position(|hash| {
            inner.entries.get(hash).map(|e| e.status.is_final()).unwrap_or(true)
        });
        let Some(idx) = finished else { break };
        if let Some(hash) = inner.order.remove(idx) {
            inner.entries.remove(&hash);
        }
    }
}

/// Interroge le receipt toutes les `poll_interval` jusqu'à `timeout`.
///
/// Les erreurs de lecture sont transitoires ici : on continue de sonder.
pub async fn wait_for_receipt(
    gateway: &dyn ContractGateway,
    tx_hash: TxHash,
    policy: &ConfirmationPolicy,
) -> Option<TxReceipt> {
    let deadline = Instant::now() + policy.timeout;
    loop {
        match gateway.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => return Some(receipt),
            Ok(None) => {}
            Err(e) => debug!(tx_hash = %tx_hash, error = %e, "receipt lookup failed"),
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridrelay_devkit::{addr, MockGateway, ReceiptMode};
    use gridrelay_gateway::{ContractCall, WriteOptions};

    fn hash(n: u8) -> TxHash {
        TxHash::repeat_byte(n)
    }

    async fn submit(mock: &MockGateway) -> TxHash {
        let options = WriteOptions { gas_limit: 60_000, max_fee_per_gas: 1, max_priority_fee_per_gas: 1 };
        mock.write(&ContractCall::RegisterMember, &options).await.unwrap()
    }

    #[test]
    fn test_track_and_resolve_counts() {
        let tracker = TxTracker::new(8);
        tracker.track(hash(1), "anonymousVoteQuadratic", addr(1), Uuid::new_v4());
        tracker.track(hash(2), "anonymousVoteQuadratic", addr(2), Uuid::new_v4());

        tracker.resolve(hash(1), TxStatus::Confirmed { block_number: Some(10), gas_used: 21_000 });
        // Second resolve ignored: status is final
        tracker.resolve(hash(1), TxStatus::Unknown { reason: "late".into() });

        let stats = tracker.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.confirmed, 1);
        assert_eq!(stats.unknown, 0);
        assert!(matches!(tracker.get(&hash(1)).unwrap().status, TxStatus::Confirmed { .. }));
    }

    #[test]
    fn test_tracking_same_hash_twice_keeps_final_status() {
        let tracker = TxTracker::new(8);
        let first_request = Uuid::new_v4();
        tracker.track(hash(4), "voteQuadratic", addr(1), first_request);
        tracker.resolve(hash(4), TxStatus::Confirmed { block_number: Some(3), gas_used: 50_000 });

        tracker.track(hash(4), "voteQuadratic", addr(1), Uuid::new_v4());

        let entry = tracker.get(&hash(4)).unwrap();
        assert!(matches!(entry.status, TxStatus::Confirmed { .. }));
        assert_eq!(entry.request_id, first_request);
        let stats = tracker.stats();
        assert_eq!((stats.submitted, stats.pending, stats.confirmed), (1, 0, 1));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_eviction_keeps_pending_entries() {
        let tracker = TxTracker::new(2);
        tracker.track(hash(1), "voteQuadratic", addr(1), Uuid::new_v4());
        tracker.track(hash(2), "voteQuadratic", addr(1), Uuid::new_v4());
        tracker.resolve(hash(2), TxStatus::Confirmed { block_number: None, gas_used: 1 });
        tracker.track(hash(3), "voteQuadratic", addr(1), Uuid::new_v4());

        assert_eq!(tracker.len(), 2);
        assert!(tracker.get(&hash(1)).is_some());
        assert!(tracker.get(&hash(2)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_confirmation() {
        let mock = Arc::new(MockGateway::new());
        let tx_hash = submit(&mock).await;
        let tracker = TxTracker::default();
        tracker.track(tx_hash, "registerMember", addr(1), Uuid::new_v4());

        let status = tracker
            .spawn_confirmation(mock.clone(), tx_hash, ConfirmationPolicy::default())
            .await
            .unwrap();

        assert_eq!(status, TxStatus::Confirmed { block_number: Some(1_001), gas_used: 50_000 });
        assert_eq!(tracker.get(&tx_hash).unwrap().status, status);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout_is_unknown() {
        let mock = Arc::new(MockGateway::new().with_receipt_mode(ReceiptMode::Never));
        let tx_hash = submit(&mock).await;
        let policy = ConfirmationPolicy { timeout: Duration::from_secs(10), poll_interval: Duration::from_secs(2) };

        let start = Instant::now();
        let receipt = wait_for_receipt(mock.as_ref(), tx_hash, &policy).await;

        assert!(receipt.is_none());
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert!(matches!(TxStatus::from_receipt(None, &policy), TxStatus::Unknown { .. }));
    }
}
