/*!
# GridRelay Gateway - Façade typée du contrat EnergyGridDAO

Point d'accès unique au ledger pour tout le reste du workspace :
- Lectures typées (membres, statistiques, propositions, crédits de vote)
- Estimation de gas et écriture signée par l'identité unique du processus
- Lecture des receipts et sonde de connectivité (numéro de bloc)

Aucune politique de retry ici : les erreurs remontent telles quelles,
c'est le kernel qui décide si une nouvelle tentative a du sens.
*/

pub mod abi;
pub mod error;
pub mod evm;
pub mod types;
pub mod units;

pub use alloy::primitives::{Address, TxHash, U256};
pub use error::GatewayError;
pub use evm::{connect, EvmGateway};
pub use types::{
    ContractCall, Member, MemberInfo, Proposal, SystemStats, TxReceipt, VotingCreditsInfo,
    WriteOptions,
};

use async_trait::async_trait;

/// Interface lecture/écriture du contrat, implémentée par `EvmGateway`
/// (nœud RPC réel) et par le `MockGateway` du devkit.
#[async_trait]
pub trait ContractGateway: Send + Sync {
    /// Identité qui signe toutes les écritures de ce processus
    fn signer_address(&self) -> Address;

    /// `getMemberInfo(address)`
    async fn member_info(&self, member: Address) -> Result<MemberInfo, GatewayError>;

    /// `getSystemStats()`
    async fn system_stats(&self) -> Result<SystemStats, GatewayError>;

    /// `getProposal(id)` ; une proposition inexistante revient avec un proposer nul
    async fn proposal(&self, id: u64) -> Result<Proposal, GatewayError>;

    /// `getVotingCreditsInfo(address)`
    async fn voting_credits_info(&self, member: Address) -> Result<VotingCreditsInfo, GatewayError>;

    /// Adresses de tous les membres enregistrés (événements `MemberRegistered`)
    async fn member_addresses(&self) -> Result<Vec<Address>, GatewayError>;

    /// Numéro du dernier bloc, utilisé comme sonde de santé
    async fn block_number(&self) -> Result<u64, GatewayError>;

    async fn estimate_gas(&self, call: &ContractCall) -> Result<u64, GatewayError>;

    /// Soumet une transaction signée ; retourne le hash dès l'envoi, sans attendre l'inclusion
    async fn write(&self, call: &ContractCall, options: &WriteOptions) -> Result<TxHash, GatewayError>;

    /// `None` tant que la transaction n'est pas incluse dans un bloc
    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, GatewayError>;
}
