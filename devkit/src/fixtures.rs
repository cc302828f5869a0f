/*!
Builders de fixtures pour les tests

Produit des membres, propositions et corps de requête `/relay-vote`
cohérents, avec des valeurs par défaut réalistes.
*/

use gridrelay_gateway::{Address, MemberInfo, Proposal, VotingCreditsInfo, U256};
use serde_json::{json, Map, Value};

/// Adresse déterministe `0xnnnn...nn`
pub fn addr(n: u8) -> Address {
    Address::repeat_byte(n)
}

/// Membre du ledger simulé (infos + crédits de vote optionnels)
#[derive(Debug, Clone)]
pub struct MemberBuilder {
    info: MemberInfo,
    credits: Option<VotingCreditsInfo>,
}

impl MemberBuilder {
    /// Membre enregistré, actif, sans crédits
    pub fn registered() -> Self {
        Self {
            info: MemberInfo {
                is_registered: true,
                energy_credits: U256::ZERO,
                invalid_reports_count: U256::ZERO,
                is_temporarily_suspended: false,
            },
            credits: None,
        }
    }

    pub fn unregistered() -> Self {
        let mut builder = Self::registered();
        builder.info.is_registered = false;
        builder
    }

    pub fn suspended(mut self) -> Self {
        self.info.is_temporarily_suspended = true;
        self
    }

    pub fn energy_credits(mut self, amount: u64) -> Self {
        self.info.energy_credits = U256::from(amount);
        self
    }

    pub fn invalid_reports(mut self, count: u64) -> Self {
        self.info.invalid_reports_count = U256::from(count);
        self
    }

    /// Crédits de vote courants / maximum
    pub fn voting_credits(mut self, current: u64, max: u64) -> Self {
        self.credits = Some(VotingCreditsInfo {
            current_credits: U256::from(current),
            max_credits: U256::from(max),
            months_until_next: U256::ZERO,
        });
        self
    }

    pub fn build(self) -> (MemberInfo, Option<VotingCreditsInfo>) {
        (self.info, self.credits)
    }
}

/// Proposition ; l'id est fixé par le `MockGateway` à l'insertion
#[derive(Debug, Clone)]
pub struct ProposalBuilder {
    proposal: Proposal,
}

impl ProposalBuilder {
    pub fn new(proposer: Address, description: &str) -> Self {
        Self {
            proposal: Proposal {
                id: 0,
                proposer,
                description: description.to_string(),
                yes_votes: U256::ZERO,
                no_votes: U256::ZERO,
                end_time: 0,
                executed: false,
            },
        }
    }

    pub fn votes(mut self, yes: u64, no: u64) -> Self {
        self.proposal.yes_votes = U256::from(yes);
        self.proposal.no_votes = U256::from(no);
        self
    }

    pub fn ends_at(mut self, end_time: u64) -> Self {
        self.proposal.end_time = end_time;
        self
    }

    pub fn executed(mut self) -> Self {
        self.proposal.executed = true;
        self
    }

    pub fn build(self) -> Proposal {
        self.proposal
    }
}

/// Corps JSON de `POST /relay-vote`, avec possibilité de retirer ou casser un champ
#[derive(Debug, Clone)]
pub struct RelayVoteBuilder {
    fields: Map<String, Value>,
}

impl RelayVoteBuilder {
    pub fn new() -> Self {
        let mut fields = Map::new();
        fields.insert("proposalId".into(), json!(1));
        fields.insert("voter".into(), json!(addr(0x0a).to_string()));
        fields.insert("support".into(), json!(true));
        fields.insert("intensity".into(), json!(3));
        Self { fields }
    }

    pub fn proposal_id(self, id: u64) -> Self {
        self.set("proposalId", json!(id))
    }

    pub fn voter(self, voter: Address) -> Self {
        self.set("voter", json!(voter.to_string()))
    }

    pub fn support(self, support: bool) -> Self {
        self.set("support", json!(support))
    }

    pub fn intensity(self, intensity: u64) -> Self {
        self.set("intensity", json!(intensity))
    }

    /// Remplace un champ par une valeur arbitraire (ex. mauvais type)
    pub fn set(mut self, field: &str, value: Value) -> Self {
        self.fields.insert(field.to_string(), value);
        self
    }

    pub fn without(mut self, field: &str) -> Self {
        self.fields.remove(field);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn to_body(self) -> String {
        self.build().to_string()
    }
}

impl Default for RelayVoteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_vote_builder() {
        let body = RelayVoteBuilder::new().intensity(9).without("support").build();
        assert_eq!(body["intensity"], 9);
        assert!(body.get("support").is_none());
        assert_eq!(body["proposalId"], 1);
    }

    #[test]
    fn test_member_builder() {
        let (info, credits) = MemberBuilder::registered().suspended().voting_credits(4, 10).build();
        assert!(info.is_registered);
        assert!(info.is_temporarily_suspended);
        assert_eq!(credits.map(|c| c.max_credits), Some(U256::from(10u64)));
    }
}
