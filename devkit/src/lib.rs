/*!
# GridRelay DevKit - Ledger simulé et utilitaires de test

Bibliothèque facilitant les tests du kernel sans nœud RPC :
- `MockGateway` : ledger en mémoire, réponses scriptées, compteurs d'appels
- Fixtures : adresses, membres, propositions, corps JSON de `/relay-vote`
- Init du logging pour les tests
*/

pub mod fixtures;
pub mod mock_gateway;
pub mod test_utils;

pub use fixtures::{addr, MemberBuilder, ProposalBuilder, RelayVoteBuilder};
pub use mock_gateway::{MockGateway, ReceiptMode, RecordedWrite};
pub use test_utils::init_test_logging;
