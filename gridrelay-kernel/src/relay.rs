/**
 * RELAIS DE TRANSACTIONS - Action métier → transaction confirmée
 *
 * RÔLE :
 * Transforme une action (rapport de production, vote anonyme, transfert...)
 * en transaction on-chain malgré les pannes réseau/RPC transitoires.
 *
 * FONCTIONNEMENT :
 * 1. Précondition : statut du membre lu, refus immédiat si non enregistré
 *    ou suspendu (aucune soumission)
 * 2. Estimation du gas + buffer fixe de 20% (arrondi au supérieur)
 * 3. Soumission avec le gas bufferisé et le plafond de fee configuré ;
 *    la référence est enregistrée dès l'envoi
 * 4. Confirmation : attente de l'inclusion (`Wait`) ou retour immédiat de
 *    la référence avec suivi en tâche de fond (`Background`)
 *
 * Estimation et soumission passent par le contrôleur de retry ; un revert
 * constaté à la confirmation est terminal. Les écritures sont sérialisées
 * derrière un mutex unique (une seule identité de signature), les lectures
 * restent concurrentes.
 */

use std::sync::Arc;

use gridrelay_gateway::units::kwh_to_base_units;
use gridrelay_gateway::{
    Address, ContractCall, ContractGateway, GatewayError, Member, MemberInfo, TxHash, TxReceipt,
    WriteOptions, U256,
};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::connectivity::ConnectivityMonitor;
use crate::retry::{ErrorClass, Exhausted, RetryPolicy};
use crate::tracker::{wait_for_receipt, ConfirmationPolicy, TxStatus, TxTracker};

const GWEI: u128 = 1_000_000_000;

/// Politique de fee : buffer de gas fixe et plafonds EIP-1559
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub gas_buffer_percent: u64,
}

impl FeePolicy {
    /// Pourboire par défaut de 1 gwei, jamais au-dessus du plafond
    pub fn new(max_fee_per_gas: u128) -> Self {
        Self {
            max_fee_per_gas,
            max_priority_fee_per_gas: GWEI.min(max_fee_per_gas),
            gas_buffer_percent: 20,
        }
    }

    pub fn write_options(&self, estimate: u64) -> WriteOptions {
        WriteOptions {
            gas_limit: buffered_gas_limit(estimate, self.gas_buffer_percent),
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas.min(self.max_fee_per_gas),
        }
    }
}

/// `ceil(estimate * (100 + buffer) / 100)`, calculé sans débordement
pub fn buffered_gas_limit(estimate: u64, buffer_percent: u64) -> u64 {
    let scaled = (estimate as u128 * (100 + buffer_percent as u128)).div_ceil(100);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Bloque jusqu'au receipt (appelants synchrones)
    Wait,
    /// Retourne la référence dès l'envoi, confirmation suivie en tâche de fond
    Background,
}

/// Vote quadratique soumis par le relayer pour le compte de `voter`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayRequest {
    pub proposal_id: u64,
    pub voter: Address,
    pub support: bool,
    pub intensity: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub tx_hash: TxHash,
    pub operation: &'static str,
    pub actor: Address,
    pub request_id: Uuid,
    pub gas_limit: u64,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub enum RelayOutcome {
    Pending(Submission),
    Confirmed { submission: Submission, receipt: TxReceipt },
}

impl RelayOutcome {
    pub fn submission(&self) -> &Submission {
        match self {
            RelayOutcome::Pending(s) => s,
            RelayOutcome::Confirmed { submission, .. } => submission,
        }
    }

    pub fn tx_hash(&self) -> TxHash {
        self.submission().tx_hash
    }
}

/// Motif de refus avant toute soumission
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationReason {
    #[error("member is not registered")]
    NotRegistered,
    #[error("member is temporarily suspended")]
    Suspended,
    #[error("member is already registered")]
    AlreadyRegistered,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("vote intensity must be greater than zero")]
    ZeroIntensity,
    #[error("proposal description must not be empty")]
    EmptyDescription,
    #[error("recipient must not be the zero address")]
    ZeroRecipient,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{operation} rejected for {actor}: {reason}")]
    Validation {
        operation: &'static str,
        actor: Address,
        reason: ValidationReason,
    },
    #[error("{operation} failed for {actor} after {attempts} attempt(s): {source}")]
    Gateway {
        operation: &'static str,
        actor: Address,
        attempts: u32,
        class: ErrorClass,
        #[source]
        source: GatewayError,
    },
    #[error("{operation} for {actor} reverted on-chain (tx {tx_hash})")]
    Reverted {
        operation: &'static str,
        actor: Address,
        tx_hash: TxHash,
        block_number: Option<u64>,
    },
    #[error("{operation} for {actor}: no receipt for tx {tx_hash} after {waited_secs}s")]
    ConfirmationTimeout {
        operation: &'static str,
        actor: Address,
        tx_hash: TxHash,
        waited_secs: u64,
    },
}

impl RelayError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RelayError::Validation { .. } => ErrorClass::Validation,
            RelayError::Gateway { class, .. } => *class,
            RelayError::Reverted { .. } => ErrorClass::Revert,
            RelayError::ConfirmationTimeout { .. } => ErrorClass::Transient,
        }
    }

    /// Raison structurée (motif de validation ou raison du revert)
    pub fn reason(&self) -> Option<String> {
        match self {
            RelayError::Validation { reason, .. } => Some(reason.to_string()),
            RelayError::Gateway { source, .. } => source.reason().map(str::to_string),
            RelayError::Reverted { .. } => Some("execution reverted".to_string()),
            RelayError::ConfirmationTimeout { .. } => None,
        }
    }

    /// Message de l'erreur imbriquée, tel que renvoyé par le nœud
    pub fn nested_message(&self) -> Option<&str> {
        match self {
            RelayError::Gateway { source, .. } if !source.message().is_empty() => Some(source.message()),
            _ => None,
        }
    }

    fn gateway(operation: &'static str, actor: Address, failed: Exhausted<GatewayError>) -> Self {
        RelayError::Gateway {
            operation,
            actor,
            attempts: failed.attempts,
            class: failed.class,
            source: failed.error,
        }
    }
}

pub struct TransactionRelay {
    gateway: Arc<dyn ContractGateway>,
    connectivity: ConnectivityMonitor,
    tracker: TxTracker,
    retry: RetryPolicy,
    fees: FeePolicy,
    confirmation: ConfirmationPolicy,
    write_lock: tokio::sync::Mutex<()>,
}

impl TransactionRelay {
    pub fn new(
        gateway: Arc<dyn ContractGateway>,
        connectivity: ConnectivityMonitor,
        tracker: TxTracker,
        retry: RetryPolicy,
        fees: FeePolicy,
        confirmation: ConfirmationPolicy,
    ) -> Self {
        Self {
            gateway,
            connectivity,
            tracker,
            retry,
            fees,
            confirmation,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Identité du relayer (signataire unique)
    pub fn signer(&self) -> Address {
        self.gateway.signer_address()
    }

    /// Reporte le résultat d'une interaction au moniteur : seule une erreur
    /// de transport compte comme un échec de connectivité
    fn observe<T>(&self, result: Result<T, GatewayError>) -> Result<T, GatewayError> {
        match &result {
            Err(GatewayError::Transport(_)) => self.connectivity.record_failure(),
            _ => self.connectivity.record_success(),
        }
        result
    }

    /// Statut d'un membre (infos + crédits de vote), lu avec retry
    pub async fn member_status(&self, member: Address) -> Result<Member, RelayError> {
        let operation = "checkMemberStatus";
        let read = self
            .retry
            .run(operation, move |_| async move {
                let info = self.observe(self.gateway.member_info(member).await)?;
                let credits = if info.is_registered {
                    Some(self.observe(self.gateway.voting_credits_info(member).await)?)
                } else {
                    None
                };
                Ok::<_, GatewayError>((info, credits))
            })
            .await
            .map_err(|e| RelayError::gateway(operation, member, e))?;
        let (info, credits) = read.value;
        Ok(Member::from_snapshot(member, &info, credits.as_ref()))
    }

    async fn member_info(&self, operation: &'static str, member: Address) -> Result<MemberInfo, RelayError> {
        self.retry
            .run(operation, move |_| async move { self.observe(self.gateway.member_info(member).await) })
            .await
            .map(|r| r.value)
            .map_err(|e| RelayError::gateway(operation, member, e))
    }

    /// Précondition commune : membre enregistré et non suspendu
    async fn require_active_member(&self, operation: &'static str, actor: Address) -> Result<(), RelayError> {
        let info = self.member_info(operation, actor).await?;
        let reason = if !info.is_registered {
            ValidationReason::NotRegistered
        } else if info.is_temporarily_suspended {
            ValidationReason::Suspended
        } else {
            return Ok(());
        };
        warn!(operation, actor = %actor, %reason, "precondition failed, nothing submitted");
        Err(RelayError::Validation { operation, actor, reason })
    }

    pub async fn register_member(&self, confirmation: Confirmation) -> Result<RelayOutcome, RelayError> {
        let operation = "registerMember";
        let actor = self.signer();
        let info = self.member_info(operation, actor).await?;
        if info.is_registered {
            return Err(RelayError::Validation {
                operation,
                actor,
                reason: ValidationReason::AlreadyRegistered,
            });
        }
        self.submit(operation, actor, ContractCall::RegisterMember, confirmation).await
    }

    /// Rapport de production d'un appareil, en kWh décimaux (1 kWh = 1 crédit)
    pub async fn report_energy_production(
        &self,
        device: Address,
        amount_kwh: &str,
        confirmation: Confirmation,
    ) -> Result<RelayOutcome, RelayError> {
        let operation = "reportEnergyProduction";
        let amount = match kwh_to_base_units(amount_kwh) {
            Some(amount) if !amount.is_zero() => amount,
            _ => {
                return Err(RelayError::Validation {
                    operation,
                    actor: device,
                    reason: ValidationReason::InvalidAmount(amount_kwh.to_string()),
                })
            }
        };
        self.require_active_member(operation, device).await?;
        self.submit(operation, device, ContractCall::ReportEnergyProduction { amount }, confirmation)
            .await
    }

    pub async fn transfer_credits(
        &self,
        to: Address,
        amount: U256,
        confirmation: Confirmation,
    ) -> Result<RelayOutcome, RelayError> {
        let operation = "transferCredits";
        let actor = self.signer();
        check_transfer(operation, actor, to, amount)?;
        self.require_active_member(operation, actor).await?;
        self.submit(operation, actor, ContractCall::TransferCredits { to, amount }, confirmation)
            .await
    }

    pub async fn create_proposal(
        &self,
        description: &str,
        confirmation: Confirmation,
    ) -> Result<RelayOutcome, RelayError> {
        let operation = "createProposal";
        let actor = self.signer();
        if description.trim().is_empty() {
            return Err(RelayError::Validation {
                operation,
                actor,
                reason: ValidationReason::EmptyDescription,
            });
        }
        self.require_active_member(operation, actor).await?;
        let call = ContractCall::CreateProposal { description: description.to_string() };
        self.submit(operation, actor, call, confirmation).await
    }

    pub async fn vote_quadratic(
        &self,
        proposal_id: u64,
        support: bool,
        intensity: u64,
        confirmation: Confirmation,
    ) -> Result<RelayOutcome, RelayError> {
        let operation = "voteQuadratic";
        let actor = self.signer();
        if intensity == 0 {
            return Err(RelayError::Validation { operation, actor, reason: ValidationReason::ZeroIntensity });
        }
        self.require_active_member(operation, actor).await?;
        let call = ContractCall::VoteQuadratic {
            proposal_id: U256::from(proposal_id),
            support,
            intensity: U256::from(intensity),
        };
        self.submit(operation, actor, call, confirmation).await
    }

    pub async fn donate_voting_credits(
        &self,
        to: Address,
        amount: U256,
        confirmation: Confirmation,
    ) -> Result<RelayOutcome, RelayError> {
        let operation = "donateVotingCredits";
        let actor = self.signer();
        check_transfer(operation, actor, to, amount)?;
        self.require_active_member(operation, actor).await?;
        self.submit(operation, actor, ContractCall::DonateVotingCredits { to, amount }, confirmation)
            .await
    }

    /// Vote anonyme relayé : l'acteur est le votant, la signature celle du relayer
    pub async fn relay_anonymous_vote(
        &self,
        request: RelayRequest,
        confirmation: Confirmation,
    ) -> Result<RelayOutcome, RelayError> {
        let operation = "anonymousVoteQuadratic";
        let actor = request.voter;
        if request.intensity == 0 {
            return Err(RelayError::Validation { operation, actor, reason: ValidationReason::ZeroIntensity });
        }
        self.require_active_member(operation, actor).await?;
        let call = ContractCall::AnonymousVoteQuadratic {
            proposal_id: U256::from(request.proposal_id),
            voter: request.voter,
            support: request.support,
            intensity: U256::from(request.intensity),
        };
        self.submit(operation, actor, call, confirmation).await
    }

    /// Estimation + soumission sous le verrou d'écriture
    async fn submit_once(&self, call: &ContractCall) -> Result<(TxHash, u64), GatewayError> {
        let _guard = self.write_lock.lock().await;
        let estimate = self.observe(self.gateway.estimate_gas(call).await)?;
        let options = self.fees.write_options(estimate);
        let tx_hash = self.observe(self.gateway.write(call, &options).await)?;
        Ok((tx_hash, options.gas_limit))
    }

    async fn submit(
        &self,
        operation: &'static str,
        actor: Address,
        call: ContractCall,
        confirmation: Confirmation,
    ) -> Result<RelayOutcome, RelayError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("relay", %request_id, operation, actor = %actor);

        async move {
            let call = &call;
            let sent = self
                .retry
                .run(operation, move |_| self.submit_once(call))
                .await
                .map_err(|e| RelayError::gateway(operation, actor, e))?;

            let (tx_hash, gas_limit) = sent.value;
            self.tracker.track(tx_hash, operation, actor, request_id);
            info!(tx_hash = %tx_hash, gas_limit, attempts = sent.attempts, "transaction submitted");

            let submission = Submission {
                tx_hash,
                operation,
                actor,
                request_id,
                gas_limit,
                attempts: sent.attempts,
            };

            match confirmation {
                Confirmation::Background => {
                    self.tracker.spawn_confirmation(self.gateway.clone(), tx_hash, self.confirmation);
                    Ok(RelayOutcome::Pending(submission))
                }
                Confirmation::Wait => self.confirm(submission).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn confirm(&self, submission: Submission) -> Result<RelayOutcome, RelayError> {
        let Submission { tx_hash, operation, actor, .. } = submission;
        let receipt = wait_for_receipt(self.gateway.as_ref(), tx_hash, &self.confirmation).await;
        self.tracker
            .resolve(tx_hash, TxStatus::from_receipt(receipt.as_ref(), &self.confirmation));

        match receipt {
            Some(receipt) if receipt.success => {
                info!(tx_hash = %tx_hash, block_number = ?receipt.block_number, gas_used = receipt.gas_used, "transaction confirmed");
                Ok(RelayOutcome::Confirmed { submission, receipt })
            }
            Some(receipt) => {
                warn!(tx_hash = %tx_hash, block_number = ?receipt.block_number, "transaction reverted");
                Err(RelayError::Reverted { operation, actor, tx_hash, block_number: receipt.block_number })
            }
            None => Err(RelayError::ConfirmationTimeout {
                operation,
                actor,
                tx_hash,
                waited_secs: self.confirmation.timeout.as_secs(),
            }),
        }
    }
}

fn check_transfer(operation: &'static str, actor: Address, to: Address, amount: U256) -> Result<(), RelayError> {
    let reason = if to == Address::ZERO {
        ValidationReason::ZeroRecipient
    } else if amount.is_zero() {
        ValidationReason::InvalidAmount("0".to_string())
    } else {
        return Ok(());
    };
    Err(RelayError::Validation { operation, actor, reason })
}
