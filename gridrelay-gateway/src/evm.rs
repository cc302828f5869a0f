/*!
# EvmGateway - Implémentation `ContractGateway` sur un nœud JSON-RPC

Construit le calldata via l'ABI `sol!`, signe avec l'unique clé du processus
(`EthereumWallet` + fillers recommandés : nonce, chain id) et traduit les
erreurs du transport en `GatewayError` sans en réécrire le message.
*/

use std::marker::PhantomData;
use std::sync::Arc;

use alloy::network::{Ethereum, EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::eth::{Filter, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{SolCall, SolEvent};
use alloy::transports::http::reqwest::{Client, Url};
use alloy::transports::http::Http;
use alloy::transports::{Transport, TransportError};
use async_trait::async_trait;
use tracing::debug;

use crate::abi::IEnergyGridDAO;
use crate::error::{revert_reason, GatewayError};
use crate::types::{
    ContractCall, MemberInfo, Proposal, SystemStats, TxReceipt, VotingCreditsInfo, WriteOptions,
};
use crate::ContractGateway;

pub struct EvmGateway<P, T> {
    provider: P,
    contract: Address,
    signer: Address,
    /// Bloc de déploiement : point de départ du scan des `MemberRegistered`
    deploy_block: u64,
    _transport: PhantomData<fn() -> T>,
}

impl<P, T> EvmGateway<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    pub fn new(provider: P, contract: Address, signer: Address, deploy_block: u64) -> Self {
        Self { provider, contract, signer, deploy_block, _transport: PhantomData }
    }

    fn request(&self, input: Vec<u8>) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.signer)
            .with_to(self.contract)
            .with_input(Bytes::from(input))
    }

    async fn view<C: SolCall>(&self, call: C) -> Result<C::Return, GatewayError> {
        let raw = self
            .provider
            .call(&self.request(call.abi_encode()))
            .await
            .map_err(map_transport_error)?;
        C::abi_decode_returns(&raw, true)
            .map_err(|e| GatewayError::Decode(format!("{}: {e}", C::SIGNATURE)))
    }
}

/// Calldata ABI d'une écriture
pub fn encode_call(call: &ContractCall) -> Vec<u8> {
    use IEnergyGridDAO as dao;
    match call {
        ContractCall::RegisterMember => dao::registerMemberCall {}.abi_encode(),
        ContractCall::ReportEnergyProduction { amount } => {
            dao::reportEnergyProductionCall { energyAmount: *amount }.abi_encode()
        }
        ContractCall::TransferCredits { to, amount } => {
            dao::transferCreditsCall { to: *to, amount: *amount }.abi_encode()
        }
        ContractCall::CreateProposal { description } => {
            dao::createProposalCall { description: description.clone() }.abi_encode()
        }
        ContractCall::VoteQuadratic { proposal_id, support, intensity } => dao::voteQuadraticCall {
            proposalId: *proposal_id,
            support: *support,
            intensity: *intensity,
        }
        .abi_encode(),
        ContractCall::DonateVotingCredits { to, amount } => {
            dao::donateVotingCreditsCall { to: *to, amount: *amount }.abi_encode()
        }
        ContractCall::AnonymousVoteQuadratic { proposal_id, voter, support, intensity } => {
            dao::anonymousVoteQuadraticCall {
                proposalId: *proposal_id,
                voter: *voter,
                support: *support,
                intensity: *intensity,
            }
            .abi_encode()
        }
    }
}

/// Traduit une erreur alloy en `GatewayError`.
///
/// Une réponse JSON-RPC du nœud devient `Rpc` (ou `Reverted` si le message
/// mentionne un revert) ; tout le reste est un échec de transport.
fn map_transport_error(err: TransportError) -> GatewayError {
    if let Some(payload) = err.as_error_resp() {
        let message = payload.message.to_string();
        if message.contains("revert") {
            return GatewayError::Reverted { reason: revert_reason(&message) };
        }
        return GatewayError::Rpc {
            code: payload.code,
            message,
            data: payload.data.as_ref().map(|d| d.get().to_string()),
        };
    }
    GatewayError::Transport(err.to_string())
}

fn saturating_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[async_trait]
impl<P, T> ContractGateway for EvmGateway<P, T>
where
    P: Provider<T, Ethereum> + Send + Sync,
    T: Transport + Clone,
{
    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn member_info(&self, member: Address) -> Result<MemberInfo, GatewayError> {
        let ret = self.view(IEnergyGridDAO::getMemberInfoCall { member }).await?;
        Ok(MemberInfo {
            is_registered: ret.isRegistered,
            energy_credits: ret.energyCredits,
            invalid_reports_count: ret.invalidReportsCount,
            is_temporarily_suspended: ret.isTemporarilySuspended,
        })
    }

    async fn system_stats(&self) -> Result<SystemStats, GatewayError> {
        let ret = self.view(IEnergyGridDAO::getSystemStatsCall {}).await?;
        Ok(SystemStats {
            total_produced: ret.totalProduced,
            total_credits: ret.totalCredits,
            total_members: ret.totalMembers,
            current_fee_rate: ret.currentFeeRate,
        })
    }

    async fn proposal(&self, id: u64) -> Result<Proposal, GatewayError> {
        let ret = self
            .view(IEnergyGridDAO::getProposalCall { proposalId: U256::from(id) })
            .await?;
        Ok(Proposal {
            id,
            proposer: ret.proposer,
            description: ret.description,
            yes_votes: ret.yesVotes,
            no_votes: ret.noVotes,
            end_time: saturating_u64(ret.endTime),
            executed: ret.executed,
        })
    }

    async fn voting_credits_info(&self, member: Address) -> Result<VotingCreditsInfo, GatewayError> {
        let ret = self.view(IEnergyGridDAO::getVotingCreditsInfoCall { member }).await?;
        Ok(VotingCreditsInfo {
            current_credits: ret.currentCredits,
            max_credits: ret.maxCredits,
            months_until_next: ret.monthsUntilNext,
        })
    }

    async fn member_addresses(&self) -> Result<Vec<Address>, GatewayError> {
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(IEnergyGridDAO::MemberRegistered::SIGNATURE_HASH)
            .from_block(self.deploy_block);
        let logs = self.provider.get_logs(&filter).await.map_err(map_transport_error)?;

        let mut members = Vec::with_capacity(logs.len());
        for log in logs {
            let decoded = log
                .log_decode::<IEnergyGridDAO::MemberRegistered>()
                .map_err(|e| GatewayError::Decode(format!("MemberRegistered: {e}")))?;
            let member = decoded.inner.data.member;
            if !members.contains(&member) {
                members.push(member);
            }
        }
        Ok(members)
    }

    async fn block_number(&self) -> Result<u64, GatewayError> {
        self.provider.get_block_number().await.map_err(map_transport_error)
    }

    async fn estimate_gas(&self, call: &ContractCall) -> Result<u64, GatewayError> {
        self.provider
            .estimate_gas(&self.request(encode_call(call)))
            .await
            .map_err(map_transport_error)
    }

    async fn write(&self, call: &ContractCall, options: &WriteOptions) -> Result<TxHash, GatewayError> {
        let tx = self
            .request(encode_call(call))
            .with_gas_limit(options.gas_limit)
            .with_max_fee_per_gas(options.max_fee_per_gas)
            .with_max_priority_fee_per_gas(options.max_priority_fee_per_gas);

        let pending = self.provider.send_transaction(tx).await.map_err(map_transport_error)?;
        let hash = *pending.tx_hash();
        debug!(method = call.method(), tx_hash = %hash, gas_limit = options.gas_limit, "transaction sent");
        Ok(hash)
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, GatewayError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(map_transport_error)?;

        Ok(receipt.map(|r| TxReceipt {
            tx_hash,
            block_number: r.block_number(),
            gas_used: u64::try_from(r.gas_used()).unwrap_or(u64::MAX),
            success: r.status(),
        }))
    }
}

/// Construit la gateway de production : provider HTTP, wallet local, fillers recommandés.
///
/// La clé est attendue en hexadécimal (avec ou sans `0x`).
pub fn connect(
    rpc_url: &str,
    contract: Address,
    signer_key: &str,
    deploy_block: u64,
) -> Result<Arc<dyn ContractGateway>, GatewayError> {
    let url: Url = rpc_url
        .parse()
        .map_err(|e| GatewayError::InvalidUrl(format!("{rpc_url}: {e}")))?;
    let signer: PrivateKeySigner = signer_key
        .trim()
        .trim_start_matches("0x")
        .parse()
        .map_err(|e| GatewayError::InvalidKey(format!("{e}")))?;
    let signer_address = signer.address();

    let provider = ProviderBuilder::new()
        .with_recommended_fillers()
        .wallet(EthereumWallet::from(signer))
        .on_http(url);

    Ok(Arc::new(EvmGateway::<_, Http<Client>>::new(
        provider,
        contract,
        signer_address,
        deploy_block,
    )))
}
