/**
 * SANTÉ SYSTÉMIQUE - Indices normalisés de la communauté énergétique
 *
 * RÔLE :
 * Transforme les compteurs bruts du contrat (statistiques, membres, crédits,
 * propositions) et l'état de connectivité en quatre sous-indices et un score
 * global affichés par le dashboard.
 *
 * FONCTIONNEMENT :
 * - Résilience : membres actifs/suspendus, uptime (ratio de sondes), stabilité
 * - Équité : Gini des crédits d'énergie, moyenne, médiane, santé de distribution
 * - Gouvernance : propositions ouvertes/récentes, participation, consensus
 * - Résonance : engagement, distribution des crédits de vote
 * - Score global = moyenne de uptime, 1 - Gini, participation, engagement
 *
 * INVARIANT :
 * Chaque champ catégoriel est calculé depuis son indicateur numérique par
 * seuils fixes ; les sous-records n'ont pas de champ modifiable isolément.
 * Les métriques sans source réelle restent `None` (jamais inventées).
 */

use std::sync::Arc;

use futures::future::try_join_all;
use gridrelay_gateway::{Address, ContractGateway, GatewayError, Member, Proposal, SystemStats, VotingCreditsInfo, U256};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::connectivity::{ConnectivityLevel, ConnectivityMonitor};

const TOKEN_SCALE: f64 = 1e18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStability {
    High,
    Medium,
    Low,
}

impl NetworkStability {
    pub fn from_uptime(uptime_percent: f64) -> Self {
        if uptime_percent >= 95.0 {
            NetworkStability::High
        } else if uptime_percent >= 85.0 {
            NetworkStability::Medium
        } else {
            NetworkStability::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionHealth {
    Balanced,
    Concentrated,
    Critical,
}

impl DistributionHealth {
    pub fn from_gini(gini: f64) -> Self {
        if gini < 0.4 {
            DistributionHealth::Balanced
        } else if gini < 0.7 {
            DistributionHealth::Concentrated
        } else {
            DistributionHealth::Critical
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusLevel {
    High,
    Medium,
    Low,
}

impl ConsensusLevel {
    pub fn from_participation(rate_percent: f64) -> Self {
        if rate_percent > 70.0 {
            ConsensusLevel::High
        } else if rate_percent > 40.0 {
            ConsensusLevel::Medium
        } else {
            ConsensusLevel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditsDistribution {
    Healthy,
    Concentrated,
    Depleted,
}

impl CreditsDistribution {
    /// Épuisé sous 20% de crédits restants, concentré dès un Gini de 0.4
    pub fn from_credits(remaining_percent: f64, credits_gini: f64) -> Self {
        if remaining_percent < 20.0 {
            CreditsDistribution::Depleted
        } else if credits_gini >= 0.4 {
            CreditsDistribution::Concentrated
        } else {
            CreditsDistribution::Healthy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PulseStatus {
    Healthy,
    Stable,
    Attention,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resilience {
    active_members: u64,
    suspended_members: u64,
    contract_uptime: f64,
    network_stability: NetworkStability,
}

impl Resilience {
    pub fn new(active_members: u64, suspended_members: u64, contract_uptime: f64) -> Self {
        let contract_uptime = contract_uptime.clamp(0.0, 100.0);
        Self {
            active_members,
            suspended_members,
            contract_uptime,
            network_stability: NetworkStability::from_uptime(contract_uptime),
        }
    }

    pub fn active_members(&self) -> u64 {
        self.active_members
    }

    pub fn suspended_members(&self) -> u64 {
        self.suspended_members
    }

    pub fn contract_uptime(&self) -> f64 {
        self.contract_uptime
    }

    pub fn network_stability(&self) -> NetworkStability {
        self.network_stability
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Equity {
    gini_coefficient: f64,
    average_balance: f64,
    median_balance: f64,
    distribution_health: DistributionHealth,
}

impl Equity {
    pub fn new(gini_coefficient: f64, average_balance: f64, median_balance: f64) -> Self {
        let gini_coefficient = gini_coefficient.clamp(0.0, 1.0);
        Self {
            gini_coefficient,
            average_balance,
            median_balance,
            distribution_health: DistributionHealth::from_gini(gini_coefficient),
        }
    }

    pub fn gini_coefficient(&self) -> f64 {
        self.gini_coefficient
    }

    pub fn average_balance(&self) -> f64 {
        self.average_balance
    }

    pub fn median_balance(&self) -> f64 {
        self.median_balance
    }

    pub fn distribution_health(&self) -> DistributionHealth {
        self.distribution_health
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Governance {
    active_proposals: u64,
    recent_proposals: Vec<Proposal>,
    participation_rate: f64,
    consensus_level: ConsensusLevel,
}

impl Governance {
    pub fn new(active_proposals: u64, recent_proposals: Vec<Proposal>, participation_rate: f64) -> Self {
        let participation_rate = participation_rate.clamp(0.0, 100.0);
        Self {
            active_proposals,
            recent_proposals,
            participation_rate,
            consensus_level: ConsensusLevel::from_participation(participation_rate),
        }
    }

    pub fn active_proposals(&self) -> u64 {
        self.active_proposals
    }

    pub fn recent_proposals(&self) -> &[Proposal] {
        &self.recent_proposals
    }

    pub fn participation_rate(&self) -> f64 {
        self.participation_rate
    }

    pub fn consensus_level(&self) -> ConsensusLevel {
        self.consensus_level
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resonance {
    community_engagement: f64,
    voting_credits_remaining: f64,
    voting_credits_gini: f64,
    voting_credits_distribution: CreditsDistribution,
    /// Pas de source on-chain (historique des transferts/dons) : non calculé
    collaboration_index: Option<f64>,
}

impl Resonance {
    pub fn new(community_engagement: f64, voting_credits_remaining: f64, voting_credits_gini: f64) -> Self {
        let voting_credits_remaining = voting_credits_remaining.clamp(0.0, 100.0);
        let voting_credits_gini = voting_credits_gini.clamp(0.0, 1.0);
        Self {
            community_engagement: community_engagement.clamp(0.0, 100.0),
            voting_credits_remaining,
            voting_credits_gini,
            voting_credits_distribution: CreditsDistribution::from_credits(
                voting_credits_remaining,
                voting_credits_gini,
            ),
            collaboration_index: None,
        }
    }

    pub fn community_engagement(&self) -> f64 {
        self.community_engagement
    }

    pub fn voting_credits_distribution(&self) -> CreditsDistribution {
        self.voting_credits_distribution
    }

    pub fn collaboration_index(&self) -> Option<f64> {
        self.collaboration_index
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    pub resilience: Resilience,
    pub equity: Equity,
    pub governance: Governance,
    pub resonance: Resonance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pulse {
    pub score: f64,
    pub status: PulseStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub health: SystemHealth,
    pub pulse: Pulse,
}

/// Coefficient de Gini sur des soldes positifs ; 0 si la somme est nulle.
///
/// `G = (2 * Σ(i * b_i) - (N + 1) * Σb_i) / (N * Σb_i)`, i à partir de 1,
/// soldes triés par ordre croissant.
pub fn gini(balances: &[f64]) -> f64 {
    let n = balances.len();
    if n == 0 {
        return 0.0;
    }
    let mut sorted: Vec<f64> = balances.iter().map(|b| b.max(0.0)).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let total: f64 = sorted.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    let weighted: f64 = sorted.iter().enumerate().map(|(i, b)| (i as f64 + 1.0) * b).sum();
    let n = n as f64;
    ((2.0 * weighted - (n + 1.0) * total) / (n * total)).clamp(0.0, 1.0)
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn to_f64(value: U256) -> f64 {
    u128::try_from(value).map(|v| v as f64).unwrap_or(f64::MAX)
}

/// Moyenne des quatre facteurs normalisés, chacun borné à [0, 1]
pub fn overall_score(uptime_percent: f64, gini: f64, participation_percent: f64, engagement_percent: f64) -> f64 {
    let factors = [
        uptime_percent / 100.0,
        1.0 - gini,
        participation_percent / 100.0,
        engagement_percent / 100.0,
    ];
    factors.iter().map(|f| f.clamp(0.0, 1.0)).sum::<f64>() / factors.len() as f64
}

/// Statut du pulse ; une connectivité CRITICAL force `critical`
pub fn pulse_status(score: f64, connectivity: ConnectivityLevel) -> PulseStatus {
    if connectivity == ConnectivityLevel::Critical {
        return PulseStatus::Critical;
    }
    if score >= 0.8 {
        PulseStatus::Healthy
    } else if score >= 0.6 {
        PulseStatus::Stable
    } else if score >= 0.4 {
        PulseStatus::Attention
    } else {
        PulseStatus::Critical
    }
}

/// Membre lu pour le calcul, avec ses crédits de vote s'il en a
#[derive(Debug, Clone)]
pub struct MemberSample {
    pub member: Member,
    pub credits: Option<VotingCreditsInfo>,
}

/// Données brutes d'un calcul de santé
#[derive(Debug, Clone)]
pub struct HealthInputs {
    pub stats: SystemStats,
    pub members: Vec<MemberSample>,
    /// Propositions existantes, par id croissant
    pub proposals: Vec<Proposal>,
    pub now_unix: u64,
    pub uptime_percent: f64,
    pub connectivity: ConnectivityLevel,
    pub recent_limit: usize,
}

/// Calcul pur : mêmes entrées, même rapport
pub fn compute_health(inputs: &HealthInputs) -> HealthReport {
    let registered: Vec<&MemberSample> = inputs.members.iter().filter(|m| m.member.is_registered).collect();

    let suspended = registered.iter().filter(|m| m.member.is_temporarily_suspended).count() as u64;
    let active = registered.len() as u64 - suspended;
    let resilience = Resilience::new(active, suspended, inputs.uptime_percent);

    let balances: Vec<f64> = registered
        .iter()
        .map(|m| to_f64(m.member.energy_credits) / TOKEN_SCALE)
        .collect();
    let total_members = to_f64(inputs.stats.total_members).max(1.0);
    let average = to_f64(inputs.stats.total_credits) / TOKEN_SCALE / total_members;
    let equity = Equity::new(gini(&balances), average, median(&balances));

    let active_proposals = inputs.proposals.iter().filter(|p| p.is_open(inputs.now_unix)).count() as u64;
    let recent: Vec<Proposal> = inputs
        .proposals
        .iter()
        .rev()
        .take(inputs.recent_limit)
        .cloned()
        .collect();

    // Participation : membres dont les crédits de vote courants sont entamés
    let with_credits: Vec<&VotingCreditsInfo> = registered
        .iter()
        .filter_map(|m| m.credits.as_ref())
        .filter(|c| !c.max_credits.is_zero())
        .collect();
    let participants = with_credits.iter().filter(|c| c.current_credits < c.max_credits).count();
    let participation = if with_credits.is_empty() {
        0.0
    } else {
        participants as f64 / with_credits.len() as f64 * 100.0
    };
    let governance = Governance::new(active_proposals, recent, participation);

    let engagement = (participation + 25.0).min(100.0);
    let current: Vec<f64> = with_credits.iter().map(|c| to_f64(c.current_credits)).collect();
    let max_total: f64 = with_credits.iter().map(|c| to_f64(c.max_credits)).sum();
    let remaining = if max_total == 0.0 {
        100.0
    } else {
        current.iter().sum::<f64>() / max_total * 100.0
    };
    let resonance = Resonance::new(engagement, remaining, gini(&current));

    let score = overall_score(
        resilience.contract_uptime(),
        equity.gini_coefficient(),
        governance.participation_rate(),
        resonance.community_engagement(),
    );
    let pulse = Pulse { score, status: pulse_status(score, inputs.connectivity) };

    HealthReport {
        health: SystemHealth { resilience, equity, governance, resonance },
        pulse,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("failed to read {what}: {source}")]
    Read {
        what: &'static str,
        #[source]
        source: GatewayError,
    },
}

fn read_err(what: &'static str) -> impl Fn(GatewayError) -> HealthError {
    move |source| HealthError::Read { what, source }
}

/// Collecte les données via la gateway et calcule le rapport
pub struct HealthAggregator {
    gateway: Arc<dyn ContractGateway>,
    connectivity: ConnectivityMonitor,
    recent_proposals: usize,
    proposal_scan_limit: u64,
}

impl HealthAggregator {
    pub fn new(
        gateway: Arc<dyn ContractGateway>,
        connectivity: ConnectivityMonitor,
        recent_proposals: usize,
        proposal_scan_limit: u64,
    ) -> Self {
        Self { gateway, connectivity, recent_proposals, proposal_scan_limit }
    }

    async fn sample(&self, address: Address) -> Result<MemberSample, HealthError> {
        let info = self.gateway.member_info(address).await.map_err(read_err("member info"))?;
        let credits = if info.is_registered {
            Some(
                self.gateway
                    .voting_credits_info(address)
                    .await
                    .map_err(read_err("voting credits"))?,
            )
        } else {
            None
        };
        Ok(MemberSample {
            member: Member::from_snapshot(address, &info, credits.as_ref()),
            credits,
        })
    }

    /// Parcourt les ids à partir de 1 jusqu'au premier proposer nul
    async fn proposals(&self) -> Result<Vec<Proposal>, HealthError> {
        let mut proposals = Vec::new();
        for id in 1..=self.proposal_scan_limit {
            let proposal = self.gateway.proposal(id).await.map_err(read_err("proposal"))?;
            if !proposal.exists() {
                break;
            }
            proposals.push(proposal);
        }
        Ok(proposals)
    }

    pub async fn compute(&self) -> Result<HealthReport, HealthError> {
        let stats = self.gateway.system_stats().await.map_err(read_err("system stats"))?;
        let addresses = self.gateway.member_addresses().await.map_err(read_err("member list"))?;

        let (members, proposals) = futures::try_join!(
            try_join_all(addresses.into_iter().map(|a| self.sample(a))),
            self.proposals(),
        )?;

        let connectivity = self.connectivity.snapshot();
        let now_unix = u64::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0);
        debug!(members = members.len(), proposals = proposals.len(), "health inputs collected");

        Ok(compute_health(&HealthInputs {
            stats,
            members,
            proposals,
            now_unix,
            uptime_percent: connectivity.uptime_percent,
            connectivity: connectivity.level,
            recent_limit: self.recent_proposals,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridrelay_devkit::{addr, MemberBuilder, MockGateway, ProposalBuilder};
    use std::time::Duration;

    const TOKEN: u64 = 1_000_000_000_000_000_000;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_gini_properties() {
        assert_eq!(gini(&[]), 0.0);
        assert_eq!(gini(&[0.0, 0.0, 0.0]), 0.0);
        assert!(close(gini(&[7.0, 7.0, 7.0, 7.0]), 0.0));

        // [0, ..., 0, N] tend vers 1 quand le nombre de zéros augmente
        let g4 = gini(&[0.0, 0.0, 0.0, 10.0]);
        let mut many = vec![0.0; 99];
        many.push(10.0);
        let g100 = gini(&many);
        assert!(close(g4, 0.75));
        assert!(close(g100, 0.99));
        assert!(g100 > g4);

        // Invariance d'échelle
        let base = [1.0, 2.0, 3.0, 10.0];
        let scaled: Vec<f64> = base.iter().map(|b| b * 1e6).collect();
        assert!(close(gini(&base), gini(&scaled)));
    }

    #[test]
    fn test_network_stability_boundaries() {
        assert_eq!(NetworkStability::from_uptime(95.0), NetworkStability::High);
        assert_eq!(NetworkStability::from_uptime(94.99), NetworkStability::Medium);
        assert_eq!(NetworkStability::from_uptime(85.0), NetworkStability::Medium);
        assert_eq!(NetworkStability::from_uptime(84.99), NetworkStability::Low);
    }

    #[test]
    fn test_category_thresholds() {
        assert_eq!(DistributionHealth::from_gini(0.39), DistributionHealth::Balanced);
        assert_eq!(DistributionHealth::from_gini(0.4), DistributionHealth::Concentrated);
        assert_eq!(DistributionHealth::from_gini(0.7), DistributionHealth::Critical);
        assert_eq!(ConsensusLevel::from_participation(70.0), ConsensusLevel::Medium);
        assert_eq!(ConsensusLevel::from_participation(70.1), ConsensusLevel::High);
        assert_eq!(ConsensusLevel::from_participation(40.0), ConsensusLevel::Low);
        assert_eq!(CreditsDistribution::from_credits(19.9, 0.0), CreditsDistribution::Depleted);
        assert_eq!(CreditsDistribution::from_credits(50.0, 0.5), CreditsDistribution::Concentrated);
        assert_eq!(CreditsDistribution::from_credits(50.0, 0.1), CreditsDistribution::Healthy);
    }

    #[test]
    fn test_pulse_thresholds_and_override() {
        assert_eq!(pulse_status(0.8, ConnectivityLevel::Healthy), PulseStatus::Healthy);
        assert_eq!(pulse_status(0.79, ConnectivityLevel::Degraded), PulseStatus::Stable);
        assert_eq!(pulse_status(0.4, ConnectivityLevel::Healthy), PulseStatus::Attention);
        assert_eq!(pulse_status(0.39, ConnectivityLevel::Healthy), PulseStatus::Critical);
        assert_eq!(pulse_status(0.95, ConnectivityLevel::Critical), PulseStatus::Critical);
    }

    #[test]
    fn test_overall_score_is_mean_of_factors() {
        assert!(close(overall_score(100.0, 0.0, 100.0, 100.0), 1.0));
        assert!(close(overall_score(80.0, 0.2, 40.0, 65.0), (0.8 + 0.8 + 0.4 + 0.65) / 4.0));
    }

    #[test]
    fn test_categories_follow_numbers() {
        let r = Resilience::new(3, 1, 150.0);
        assert_eq!(r.contract_uptime(), 100.0);
        assert_eq!(r.network_stability(), NetworkStability::High);
        assert_eq!(Equity::new(0.55, 1.0, 1.0).distribution_health(), DistributionHealth::Concentrated);
    }

    fn sample(address: Address, credits: u64, suspended: bool, voting: Option<(u64, u64)>) -> MemberSample {
        let mut builder = MemberBuilder::registered().energy_credits(credits);
        if suspended {
            builder = builder.suspended();
        }
        if let Some((current, max)) = voting {
            builder = builder.voting_credits(current, max);
        }
        let (info, credits) = builder.build();
        MemberSample { member: Member::from_snapshot(address, &info, credits.as_ref()), credits }
    }

    #[test]
    fn test_compute_health_from_inputs() {
        let proposals = vec![
            ProposalBuilder::new(addr(1), "Old").ends_at(100).executed().build(),
            ProposalBuilder::new(addr(1), "Open").ends_at(5_000).build(),
            ProposalBuilder::new(addr(2), "Closed").ends_at(500).build(),
        ];
        let inputs = HealthInputs {
            stats: SystemStats {
                total_credits: U256::from(40u64) * U256::from(TOKEN),
                total_members: U256::from(4u64),
                ..SystemStats::default()
            },
            members: vec![
                sample(addr(1), 10 * TOKEN, false, Some((5, 10))),
                sample(addr(2), 10 * TOKEN, false, Some((10, 10))),
                sample(addr(3), 10 * TOKEN, true, Some((2, 10))),
                sample(addr(4), 10 * TOKEN, false, Some((10, 10))),
            ],
            proposals,
            now_unix: 1_000,
            uptime_percent: 100.0,
            connectivity: ConnectivityLevel::Healthy,
            recent_limit: 2,
        };

        let report = compute_health(&inputs);
        let h = &report.health;

        assert_eq!(h.resilience.active_members(), 3);
        assert_eq!(h.resilience.suspended_members(), 1);
        assert!(close(h.equity.gini_coefficient(), 0.0));
        assert!(close(h.equity.average_balance(), 10.0));
        assert!(close(h.equity.median_balance(), 10.0));
        assert_eq!(h.governance.active_proposals(), 1);
        assert_eq!(h.governance.recent_proposals().len(), 2);
        assert_eq!(h.governance.recent_proposals()[0].description, "Closed");
        assert!(close(h.governance.participation_rate(), 50.0));
        assert_eq!(h.governance.consensus_level(), ConsensusLevel::Medium);
        assert!(close(h.resonance.community_engagement(), 75.0));
        assert_eq!(h.resonance.collaboration_index(), None);
        assert!(close(report.pulse.score, (1.0 + 1.0 + 0.5 + 0.75) / 4.0));
        assert_eq!(report.pulse.status, PulseStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregator_reads_ledger() {
        let mock = Arc::new(
            MockGateway::new()
                .with_member(addr(1), MemberBuilder::registered().energy_credits(30).voting_credits(3, 10))
                .with_member(addr(2), MemberBuilder::registered().energy_credits(10).voting_credits(10, 10))
                .with_proposal(ProposalBuilder::new(addr(1), "Wind turbine").ends_at(u64::MAX))
                .with_proposal(ProposalBuilder::new(addr(2), "Heat pumps").executed())
                .with_stats(SystemStats {
                    total_credits: U256::from(40u64) * U256::from(TOKEN),
                    total_members: U256::from(2u64),
                    ..SystemStats::default()
                }),
        );
        let connectivity = ConnectivityMonitor::new(Duration::from_secs(120));
        connectivity.probe(mock.as_ref()).await;

        let aggregator = HealthAggregator::new(mock.clone(), connectivity, 5, 500);
        let report = aggregator.compute().await.unwrap();

        assert_eq!(report.health.resilience.active_members(), 2);
        assert!(close(report.health.resilience.contract_uptime(), 100.0));
        assert!(close(report.health.equity.gini_coefficient(), 0.25));
        assert!(close(report.health.equity.average_balance(), 20.0));
        assert_eq!(report.health.governance.active_proposals(), 1);
        assert_eq!(report.health.governance.recent_proposals().len(), 2);
        assert!(close(report.health.governance.participation_rate(), 50.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregator_disconnected_is_critical_and_read_failure_typed() {
        let mock = Arc::new(MockGateway::new().with_member(addr(1), MemberBuilder::registered()));
        let aggregator = HealthAggregator::new(
            mock.clone(),
            ConnectivityMonitor::new(Duration::from_secs(120)),
            5,
            500,
        );

        let report = aggregator.compute().await.unwrap();
        assert_eq!(report.pulse.status, PulseStatus::Critical);

        mock.fail_reads(Some(GatewayError::Transport("connection refused".into())));
        let err = aggregator.compute().await.unwrap_err();
        assert!(matches!(err, HealthError::Read { what: "system stats", .. }));
    }
}
