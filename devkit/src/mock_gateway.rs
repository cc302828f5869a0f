/*!
Mock du ledger pour tests sans nœud RPC

Implémente `ContractGateway` sur un état en mémoire. Les estimations,
écritures et sondes peuvent être scriptées (une réponse par appel, puis
retour au comportement par défaut), chaque appel est compté et chaque
écriture enregistrée pour les assertions.
*/

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gridrelay_gateway::{
    Address, ContractCall, ContractGateway, GatewayError, MemberInfo, Proposal, SystemStats, TxHash,
    TxReceipt, VotingCreditsInfo, WriteOptions, U256,
};

use crate::fixtures::{MemberBuilder, ProposalBuilder};

/// Ce que renvoie `transaction_receipt` pour une transaction connue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
    Confirm,
    Revert,
    /// Jamais incluse (receipt toujours `None`)
    Never,
}

/// Écriture acceptée par le mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub call: ContractCall,
    pub options: WriteOptions,
    pub tx_hash: TxHash,
}

#[derive(Default)]
struct Counters {
    write_calls: usize,
    estimate_calls: usize,
    read_calls: usize,
    probe_calls: usize,
    receipt_calls: usize,
}

struct Ledger {
    signer: Address,
    members: HashMap<Address, MemberInfo>,
    member_order: Vec<Address>,
    credits: HashMap<Address, VotingCreditsInfo>,
    proposals: Vec<Proposal>,
    stats: SystemStats,
    block: u64,
    gas_estimate: u64,
    estimate_script: VecDeque<Result<u64, GatewayError>>,
    write_script: VecDeque<Result<(), GatewayError>>,
    probe_script: VecDeque<Result<u64, GatewayError>>,
    read_failure: Option<GatewayError>,
    receipt_mode: ReceiptMode,
    write_delay: Option<Duration>,
    writes: Vec<RecordedWrite>,
    writes_in_flight: usize,
    max_writes_in_flight: usize,
    counters: Counters,
}

/// Ledger simulé, partageable via `Arc<MockGateway>`
pub struct MockGateway {
    ledger: Mutex<Ledger>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            ledger: Mutex::new(Ledger {
                signer: Address::repeat_byte(0xee),
                members: HashMap::new(),
                member_order: Vec::new(),
                credits: HashMap::new(),
                proposals: Vec::new(),
                stats: SystemStats::default(),
                block: 1_000,
                gas_estimate: 100_000,
                estimate_script: VecDeque::new(),
                write_script: VecDeque::new(),
                probe_script: VecDeque::new(),
                read_failure: None,
                receipt_mode: ReceiptMode::Confirm,
                write_delay: None,
                writes: Vec::new(),
                writes_in_flight: 0,
                max_writes_in_flight: 0,
                counters: Counters::default(),
            }),
        }
    }

    /// Ajoute (ou remplace) un membre
    pub fn with_member(self, address: Address, member: MemberBuilder) -> Self {
        {
            let mut ledger = self.ledger.lock().unwrap();
            let (info, credits) = member.build();
            if !ledger.members.contains_key(&address) {
                ledger.member_order.push(address);
            }
            ledger.members.insert(address, info);
            match credits {
                Some(c) => ledger.credits.insert(address, c),
                None => ledger.credits.remove(&address),
            };
        }
        self
    }

    /// Ajoute une proposition avec l'id suivant (à partir de 1)
    pub fn with_proposal(self, proposal: ProposalBuilder) -> Self {
        {
            let mut ledger = self.ledger.lock().unwrap();
            let mut proposal = proposal.build();
            proposal.id = ledger.proposals.len() as u64 + 1;
            ledger.proposals.push(proposal);
        }
        self
    }

    pub fn with_stats(self, stats: SystemStats) -> Self {
        self.ledger.lock().unwrap().stats = stats;
        self
    }

    pub fn with_receipt_mode(self, mode: ReceiptMode) -> Self {
        self.ledger.lock().unwrap().receipt_mode = mode;
        self
    }

    /// Durée passée "dans le nœud" par chaque écriture
    pub fn with_write_delay(self, delay: Duration) -> Self {
        self.ledger.lock().unwrap().write_delay = Some(delay);
        self
    }

    /// Prochaines réponses de `estimate_gas`, consommées une par appel
    pub fn script_estimates(&self, responses: impl IntoIterator<Item = Result<u64, GatewayError>>) {
        self.ledger.lock().unwrap().estimate_script.extend(responses);
    }

    /// Prochaines réponses de `write` ; `Ok(())` accepte l'écriture
    pub fn script_writes(&self, responses: impl IntoIterator<Item = Result<(), GatewayError>>) {
        self.ledger.lock().unwrap().write_script.extend(responses);
    }

    /// Prochaines réponses de `block_number`
    pub fn script_probes(&self, responses: impl IntoIterator<Item = Result<u64, GatewayError>>) {
        self.ledger.lock().unwrap().probe_script.extend(responses);
    }

    /// Fait échouer toutes les lectures de données (`None` pour rétablir)
    pub fn fail_reads(&self, error: Option<GatewayError>) {
        self.ledger.lock().unwrap().read_failure = error;
    }

    pub fn set_receipt_mode(&self, mode: ReceiptMode) {
        self.ledger.lock().unwrap().receipt_mode = mode;
    }

    pub fn signer(&self) -> Address {
        self.ledger.lock().unwrap().signer
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.ledger.lock().unwrap().writes.clone()
    }

    pub fn write_calls(&self) -> usize {
        self.ledger.lock().unwrap().counters.write_calls
    }

    pub fn estimate_calls(&self) -> usize {
        self.ledger.lock().unwrap().counters.estimate_calls
    }

    pub fn read_calls(&self) -> usize {
        self.ledger.lock().unwrap().counters.read_calls
    }

    pub fn probe_calls(&self) -> usize {
        self.ledger.lock().unwrap().counters.probe_calls
    }

    /// Nombre total d'interactions avec le ledger, tous types confondus
    pub fn total_calls(&self) -> usize {
        let ledger = self.ledger.lock().unwrap();
        let c = &ledger.counters;
        c.write_calls + c.estimate_calls + c.read_calls + c.probe_calls + c.receipt_calls
    }

    /// Pic d'écritures simultanées observé (1 si elles sont sérialisées)
    pub fn max_writes_in_flight(&self) -> usize {
        self.ledger.lock().unwrap().max_writes_in_flight
    }

    fn read<T>(&self, f: impl FnOnce(&Ledger) -> T) -> Result<T, GatewayError> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.counters.read_calls += 1;
        if let Some(err) = &ledger.read_failure {
            return Err(err.clone());
        }
        Ok(f(&ledger))
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_member() -> MemberInfo {
    MemberInfo {
        is_registered: false,
        energy_credits: U256::ZERO,
        invalid_reports_count: U256::ZERO,
        is_temporarily_suspended: false,
    }
}

#[async_trait]
impl ContractGateway for MockGateway {
    fn signer_address(&self) -> Address {
        self.signer()
    }

    async fn member_info(&self, member: Address) -> Result<MemberInfo, GatewayError> {
        self.read(|l| l.members.get(&member).cloned().unwrap_or_else(unknown_member))
    }

    async fn system_stats(&self) -> Result<SystemStats, GatewayError> {
        self.read(|l| l.stats.clone())
    }

    async fn proposal(&self, id: u64) -> Result<Proposal, GatewayError> {
        self.read(|l| {
            let found = id
                .checked_sub(1)
                .and_then(|idx| l.proposals.get(idx as usize))
                .cloned();
            found.unwrap_or(Proposal {
                id,
                proposer: Address::ZERO,
                description: String::new(),
                yes_votes: U256::ZERO,
                no_votes: U256::ZERO,
                end_time: 0,
                executed: false,
            })
        })
    }

    async fn voting_credits_info(&self, member: Address) -> Result<VotingCreditsInfo, GatewayError> {
        self.read(|l| {
            l.credits.get(&member).cloned().unwrap_or(VotingCreditsInfo {
                current_credits: U256::ZERO,
                max_credits: U256::ZERO,
                months_until_next: U256::ZERO,
            })
        })
    }

    async fn member_addresses(&self) -> Result<Vec<Address>, GatewayError> {
        self.read(|l| {
            l.member_order
                .iter()
                .filter(|a| l.members.get(*a).map(|m| m.is_registered).unwrap_or(false))
                .copied()
                .collect()
        })
    }

    async fn block_number(&self) -> Result<u64, GatewayError> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.counters.probe_calls += 1;
        match ledger.probe_script.pop_front() {
            Some(response) => response,
            None => Ok(ledger.block),
        }
    }

    async fn estimate_gas(&self, _call: &ContractCall) -> Result<u64, GatewayError> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.counters.estimate_calls += 1;
        match ledger.estimate_script.pop_front() {
            Some(response) => response,
            None => Ok(ledger.gas_estimate),
        }
    }

    async fn write(&self, call: &ContractCall, options: &WriteOptions) -> Result<TxHash, GatewayError> {
        let delay = {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.counters.write_calls += 1;
            ledger.writes_in_flight += 1;
            ledger.max_writes_in_flight = ledger.max_writes_in_flight.max(ledger.writes_in_flight);
            ledger.write_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut ledger = self.ledger.lock().unwrap();
        ledger.writes_in_flight -= 1;
        if let Some(Err(err)) = ledger.write_script.pop_front() {
            return Err(err);
        }

        let tx_hash = TxHash::from(U256::from(ledger.writes.len() as u64 + 1));
        ledger.writes.push(RecordedWrite { call: call.clone(), options: *options, tx_hash });
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, GatewayError> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.counters.receipt_calls += 1;
        let Some(write) = ledger.writes.iter().find(|w| w.tx_hash == tx_hash) else {
            return Ok(None);
        };
        let success = match ledger.receipt_mode {
            ReceiptMode::Never => return Ok(None),
            ReceiptMode::Confirm => true,
            ReceiptMode::Revert => false,
        };
        Ok(Some(TxReceipt {
            tx_hash,
            block_number: Some(ledger.block + 1),
            gas_used: write.options.gas_limit * 5 / 6,
            success,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::addr;

    fn options() -> WriteOptions {
        WriteOptions { gas_limit: 120_000, max_fee_per_gas: 1, max_priority_fee_per_gas: 1 }
    }

    #[tokio::test]
    async fn test_scripted_writes_then_default() {
        let mock = MockGateway::new();
        mock.script_writes([Err(GatewayError::Transport("timeout".into()))]);

        let call = ContractCall::RegisterMember;
        assert!(mock.write(&call, &options()).await.is_err());
        let hash = mock.write(&call, &options()).await.unwrap();

        assert_eq!(mock.write_calls(), 2);
        assert_eq!(mock.writes().len(), 1);
        assert_eq!(mock.writes()[0].tx_hash, hash);
    }

    #[tokio::test]
    async fn test_receipt_modes() {
        let mock = MockGateway::new();
        let hash = mock.write(&ContractCall::RegisterMember, &options()).await.unwrap();

        let receipt = mock.transaction_receipt(hash).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.gas_used, 100_000);

        mock.set_receipt_mode(ReceiptMode::Revert);
        assert!(!mock.transaction_receipt(hash).await.unwrap().unwrap().success);

        mock.set_receipt_mode(ReceiptMode::Never);
        assert!(mock.transaction_receipt(hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_members_and_proposals() {
        let mock = MockGateway::new()
            .with_member(addr(1), MemberBuilder::registered().energy_credits(50))
            .with_member(addr(2), MemberBuilder::unregistered())
            .with_proposal(ProposalBuilder::new(addr(1), "Solar canopy").ends_at(10));

        assert_eq!(mock.member_addresses().await.unwrap(), vec![addr(1)]);
        assert_eq!(mock.proposal(1).await.unwrap().description, "Solar canopy");
        assert!(!mock.proposal(2).await.unwrap().exists());
        assert!(!mock.member_info(addr(9)).await.unwrap().is_registered);
        assert_eq!(mock.read_calls(), 4);

        mock.fail_reads(Some(GatewayError::Transport("connection refused".into())));
        assert!(mock.system_stats().await.is_err());
    }
}
