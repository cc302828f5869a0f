/*!
Helpers communs aux tests du workspace
*/

use tracing_subscriber::EnvFilter;

/// Installe un subscriber qui écrit dans la sortie capturée par `cargo test`.
/// Appelable plusieurs fois : seule la première installation compte.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .ok();
}
