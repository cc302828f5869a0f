//! Types de domaine lus et écrits sur le ledger.
//!
//! Tous les montants restent en `U256` (précision arbitraire) ; la sérialisation
//! JSON les rend sous forme de chaîne décimale pour ne rien perdre côté client.

use alloy::primitives::{Address, TxHash, U256};
use serde::{Serialize, Serializer};

fn u256_as_decimal<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

fn opt_u256_as_decimal<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.collect_str(v),
        None => serializer.serialize_none(),
    }
}

/// Réponse brute de `getMemberInfo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub is_registered: bool,
    #[serde(serialize_with = "u256_as_decimal")]
    pub energy_credits: U256,
    #[serde(serialize_with = "u256_as_decimal")]
    pub invalid_reports_count: U256,
    pub is_temporarily_suspended: bool,
}

/// Réponse brute de `getVotingCreditsInfo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingCreditsInfo {
    #[serde(serialize_with = "u256_as_decimal")]
    pub current_credits: U256,
    #[serde(serialize_with = "u256_as_decimal")]
    pub max_credits: U256,
    #[serde(serialize_with = "u256_as_decimal")]
    pub months_until_next: U256,
}

/// Snapshot lecture seule d'un membre, sans garantie de fraîcheur.
///
/// Le contrat n'expose pas `lastReportTimestamp` ni `lastVotingCreditsUpdate`
/// via ses getters : ces champs restent `None` plutôt que d'être inventés.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub address: Address,
    pub is_registered: bool,
    #[serde(serialize_with = "u256_as_decimal")]
    pub energy_credits: U256,
    #[serde(serialize_with = "u256_as_decimal")]
    pub invalid_reports_count: U256,
    pub is_temporarily_suspended: bool,
    pub last_report_timestamp: Option<u64>,
    #[serde(serialize_with = "opt_u256_as_decimal")]
    pub voting_credits: Option<U256>,
    pub last_voting_credits_update: Option<u64>,
}

impl Member {
    pub fn from_snapshot(address: Address, info: &MemberInfo, credits: Option<&VotingCreditsInfo>) -> Self {
        Self {
            address,
            is_registered: info.is_registered,
            energy_credits: info.energy_credits,
            invalid_reports_count: info.invalid_reports_count,
            is_temporarily_suspended: info.is_temporarily_suspended,
            last_report_timestamp: None,
            voting_credits: credits.map(|c| c.current_credits),
            last_voting_credits_update: None,
        }
    }
}

/// Réponse de `getSystemStats`, relue à chaque appel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    #[serde(serialize_with = "u256_as_decimal")]
    pub total_produced: U256,
    #[serde(serialize_with = "u256_as_decimal")]
    pub total_credits: U256,
    #[serde(serialize_with = "u256_as_decimal")]
    pub total_members: U256,
    #[serde(serialize_with = "u256_as_decimal")]
    pub current_fee_rate: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: u64,
    pub proposer: Address,
    pub description: String,
    #[serde(serialize_with = "u256_as_decimal")]
    pub yes_votes: U256,
    #[serde(serialize_with = "u256_as_decimal")]
    pub no_votes: U256,
    /// Fin du vote, en secondes unix
    pub end_time: u64,
    pub executed: bool,
}

impl Proposal {
    /// `getProposal` sur un id inconnu renvoie une structure vide (proposer nul)
    pub fn exists(&self) -> bool {
        self.proposer != Address::ZERO
    }

    /// Ouverte : existe, non exécutée, période de vote en cours
    pub fn is_open(&self, now_unix: u64) -> bool {
        self.exists() && !self.executed && self.end_time > now_unix
    }
}

/// Les sept écritures du contrat, avec leurs arguments typés
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    RegisterMember,
    ReportEnergyProduction { amount: U256 },
    TransferCredits { to: Address, amount: U256 },
    CreateProposal { description: String },
    VoteQuadratic { proposal_id: U256, support: bool, intensity: U256 },
    DonateVotingCredits { to: Address, amount: U256 },
    /// Réservé au relayer : vote soumis pour le compte de `voter`
    AnonymousVoteQuadratic { proposal_id: U256, voter: Address, support: bool, intensity: U256 },
}

impl ContractCall {
    /// Nom de la méthode Solidity, utilisé dans les logs et les erreurs
    pub fn method(&self) -> &'static str {
        match self {
            ContractCall::RegisterMember => "registerMember",
            ContractCall::ReportEnergyProduction { .. } => "reportEnergyProduction",
            ContractCall::TransferCredits { .. } => "transferCredits",
            ContractCall::CreateProposal { .. } => "createProposal",
            ContractCall::VoteQuadratic { .. } => "voteQuadratic",
            ContractCall::DonateVotingCredits { .. } => "donateVotingCredits",
            ContractCall::AnonymousVoteQuadratic { .. } => "anonymousVoteQuadratic",
        }
    }
}

/// Paramètres de soumission fixés par le relais (gas bufferisé + plafonds EIP-1559)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub success: bool,
}
