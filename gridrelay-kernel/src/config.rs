/**
 * CONFIGURATION - Construction unique de `RelayConfig` au démarrage
 *
 * RÔLE :
 * Rassemble fichier YAML optionnel + variables d'environnement en une seule
 * structure, validée une fois puis partagée par `Arc` avec chaque composant.
 *
 * FONCTIONNEMENT :
 * - Fichier : `GRIDRELAY_CONFIG` (défaut `gridrelay.yaml`) ; absent = OK,
 *   invalide = erreur de démarrage
 * - Les variables `GRIDRELAY_*` écrasent les valeurs du fichier
 * - Obligatoires : URL RPC, adresse du contrat, clé de signature, prix max du gas
 * - Clé de signature : hex direct ou `env:AUTRE_VAR` (référence indirecte)
 */

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use gridrelay_gateway::units::gwei_to_wei;
use gridrelay_gateway::Address;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::relay::FeePolicy;
use crate::retry::RetryPolicy;
use crate::tracker::ConfirmationPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "gridrelay.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing mandatory setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

/// Montant en gwei accepté en nombre (`50`) ou en chaîne (`"1.5"`)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum GweiAmount {
    Number(f64),
    Text(String),
}

impl GweiAmount {
    fn as_text(&self) -> String {
        match self {
            GweiAmount::Number(n) => n.to_string(),
            GweiAmount::Text(s) => s.trim().to_string(),
        }
    }
}

/// Contenu brut du fichier YAML ; tout est optionnel
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub rpc_url: Option<String>,
    pub contract_address: Option<String>,
    pub signer_key: Option<String>,
    pub deploy_block: Option<u64>,
    pub max_gas_price_gwei: Option<GweiAmount>,
    pub max_priority_fee_gwei: Option<GweiAmount>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub probe_interval_secs: Option<u64>,
    pub stale_after_secs: Option<u64>,
    pub health_refresh_secs: Option<u64>,
    pub confirmation_timeout_secs: Option<u64>,
    pub receipt_poll_ms: Option<u64>,
    pub recent_proposals: Option<usize>,
    pub proposal_scan_limit: Option<u64>,
    pub listen_addr: Option<String>,
    pub mqtt: Option<MqttConf>,
}

fn parse_env<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() })
}

impl FileConfig {
    /// Applique les surcharges `GRIDRELAY_*` lues via `lookup`
    pub fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("GRIDRELAY_RPC_URL") {
            self.rpc_url = Some(v);
        }
        if let Some(v) = lookup("GRIDRELAY_CONTRACT_ADDRESS") {
            self.contract_address = Some(v);
        }
        if let Some(v) = lookup("GRIDRELAY_SIGNER_KEY") {
            self.signer_key = Some(v);
        }
        if let Some(v) = lookup("GRIDRELAY_DEPLOY_BLOCK") {
            self.deploy_block = Some(parse_env("GRIDRELAY_DEPLOY_BLOCK", &v)?);
        }
        if let Some(v) = lookup("GRIDRELAY_MAX_GAS_PRICE_GWEI") {
            self.max_gas_price_gwei = Some(GweiAmount::Text(v));
        }
        if let Some(v) = lookup("GRIDRELAY_MAX_PRIORITY_FEE_GWEI") {
            self.max_priority_fee_gwei = Some(GweiAmount::Text(v));
        }
        if let Some(v) = lookup("GRIDRELAY_MAX_RETRIES") {
            self.max_retries = Some(parse_env("GRIDRELAY_MAX_RETRIES", &v)?);
        }
        if let Some(v) = lookup("GRIDRELAY_RETRY_DELAY_MS") {
            self.retry_delay_ms = Some(parse_env("GRIDRELAY_RETRY_DELAY_MS", &v)?);
        }
        if let Some(v) = lookup("GRIDRELAY_PROBE_INTERVAL_SECS") {
            self.probe_interval_secs = Some(parse_env("GRIDRELAY_PROBE_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = lookup("GRIDRELAY_STALE_AFTER_SECS") {
            self.stale_after_secs = Some(parse_env("GRIDRELAY_STALE_AFTER_SECS", &v)?);
        }
        if let Some(v) = lookup("GRIDRELAY_HEALTH_REFRESH_SECS") {
            self.health_refresh_secs = Some(parse_env("GRIDRELAY_HEALTH_REFRESH_SECS", &v)?);
        }
        if let Some(v) = lookup("GRIDRELAY_LISTEN_ADDR") {
            self.listen_addr = Some(v);
        }
        if let Some(host) = lookup("GRIDRELAY_MQTT_HOST") {
            let port = match lookup("GRIDRELAY_MQTT_PORT") {
                Some(p) => parse_env("GRIDRELAY_MQTT_PORT", &p)?,
                None => self.mqtt.as_ref().map(|m| m.port).unwrap_or(1883),
            };
            self.mqtt = Some(MqttConf { host, port });
        } else if let (Some(p), Some(mqtt)) = (lookup("GRIDRELAY_MQTT_PORT"), self.mqtt.as_mut()) {
            mqtt.port = parse_env("GRIDRELAY_MQTT_PORT", &p)?;
        }
        Ok(())
    }
}

/// Clé privée : jamais affichée dans les logs ni dans `Debug`
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

/// Configuration validée du service
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub rpc_url: String,
    pub contract_address: Address,
    pub signer_key: SecretKey,
    pub deploy_block: u64,
    pub fees: FeePolicy,
    pub retry: RetryPolicy,
    pub confirmation: ConfirmationPolicy,
    pub probe_interval: Duration,
    pub stale_after: Duration,
    pub health_refresh: Duration,
    pub recent_proposals: usize,
    pub proposal_scan_limit: u64,
    pub listen_addr: SocketAddr,
    pub mqtt: Option<MqttConf>,
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn gwei(amount: &GweiAmount, key: &'static str) -> Result<u128, ConfigError> {
    let text = amount.as_text();
    match gwei_to_wei(&text) {
        Some(wei) if wei > 0 => Ok(wei),
        _ => Err(ConfigError::Invalid { key, reason: format!("expected a positive gwei amount, got {text:?}") }),
    }
}

/// `env:VAR` → valeur de VAR ; sinon la clé elle-même
fn resolve_key(reference: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<SecretKey, ConfigError> {
    match reference.strip_prefix("env:") {
        Some(var) => match lookup(var.trim()) {
            Some(key) if !key.trim().is_empty() => Ok(SecretKey(key.trim().to_string())),
            _ => Err(ConfigError::Invalid {
                key: "GRIDRELAY_SIGNER_KEY",
                reason: format!("referenced variable {} is not set", var.trim()),
            }),
        },
        None => Ok(SecretKey(reference.to_string())),
    }
}

impl RelayConfig {
    /// Valide le fichier (déjà surchargé par l'environnement)
    pub fn from_file(file: FileConfig, lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let rpc_url = required(file.rpc_url, "GRIDRELAY_RPC_URL")?;
        let contract_raw = required(file.contract_address, "GRIDRELAY_CONTRACT_ADDRESS")?;
        let key_ref = required(file.signer_key, "GRIDRELAY_SIGNER_KEY")?;
        let max_gas = file
            .max_gas_price_gwei
            .ok_or(ConfigError::Missing("GRIDRELAY_MAX_GAS_PRICE_GWEI"))?;

        let contract_address: Address = contract_raw.parse().map_err(|e| ConfigError::Invalid {
            key: "GRIDRELAY_CONTRACT_ADDRESS",
            reason: format!("{e}"),
        })?;
        let signer_key = resolve_key(&key_ref, lookup)?;

        let mut fees = FeePolicy::new(gwei(&max_gas, "GRIDRELAY_MAX_GAS_PRICE_GWEI")?);
        if let Some(tip) = &file.max_priority_fee_gwei {
            fees.max_priority_fee_per_gas = gwei(tip, "GRIDRELAY_MAX_PRIORITY_FEE_GWEI")?.min(fees.max_fee_per_gas);
        }

        let retry_default = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: file.max_retries.unwrap_or(retry_default.max_retries),
            delay: file.retry_delay_ms.map(Duration::from_millis).unwrap_or(retry_default.delay),
        };

        let confirmation_default = ConfirmationPolicy::default();
        let confirmation = ConfirmationPolicy {
            timeout: file
                .confirmation_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(confirmation_default.timeout),
            poll_interval: file
                .receipt_poll_ms
                .map(Duration::from_millis)
                .unwrap_or(confirmation_default.poll_interval),
        };

        let probe_interval = Duration::from_secs(file.probe_interval_secs.unwrap_or(30));
        if probe_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "GRIDRELAY_PROBE_INTERVAL_SECS",
                reason: "must be greater than zero".into(),
            });
        }
        let health_refresh = Duration::from_secs(file.health_refresh_secs.unwrap_or(60));
        if health_refresh.is_zero() {
            return Err(ConfigError::Invalid {
                key: "GRIDRELAY_HEALTH_REFRESH_SECS",
                reason: "must be greater than zero".into(),
            });
        }

        let listen_raw = file.listen_addr.unwrap_or_else(|| "0.0.0.0:3002".to_string());
        let listen_addr = listen_raw.parse().map_err(|e| ConfigError::Invalid {
            key: "GRIDRELAY_LISTEN_ADDR",
            reason: format!("{listen_raw}: {e}"),
        })?;

        Ok(Self {
            rpc_url,
            contract_address,
            signer_key,
            deploy_block: file.deploy_block.unwrap_or(0),
            fees,
            retry,
            confirmation,
            probe_interval,
            stale_after: Duration::from_secs(file.stale_after_secs.unwrap_or(120)),
            health_refresh,
            recent_proposals: file.recent_proposals.unwrap_or(5),
            proposal_scan_limit: file.proposal_scan_limit.unwrap_or(500),
            listen_addr,
            mqtt: file.mqtt,
        })
    }

    /// Lecture du fichier + environnement du processus
    pub async fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("GRIDRELAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut file = load_file(&path).await?;
        let lookup = |key: &str| std::env::var(key).ok();
        file.apply_env(&lookup)?;
        Self::from_file(file, &lookup)
    }
}

/// Fichier absent ou vide → config vide ; illisible ou invalide → erreur
pub async fn load_file(path: &str) -> Result<FileConfig, ConfigError> {
    if !Path::new(path).exists() {
        info!(path, "no config file, using environment only");
        return Ok(FileConfig::default());
    }
    let txt = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io { path: path.to_string(), source })?;
    if txt.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&txt).map_err(|source| ConfigError::Parse { path: path.to_string(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    fn mandatory() -> Vec<(&'static str, &'static str)> {
        vec![
            ("GRIDRELAY_RPC_URL", "http://127.0.0.1:8545"),
            ("GRIDRELAY_CONTRACT_ADDRESS", "0x5FbDB2315678afecb367f032d93F642f64180aa3"),
            ("GRIDRELAY_SIGNER_KEY", KEY),
            ("GRIDRELAY_MAX_GAS_PRICE_GWEI", "50"),
        ]
    }

    fn build(pairs: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let lookup = env(pairs);
        let mut file = FileConfig::default();
        file.apply_env(&lookup)?;
        RelayConfig::from_file(file, &lookup)
    }

    #[test]
    fn test_defaults_from_env_only() {
        let cfg = build(&mandatory()).unwrap();
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.delay, Duration::from_millis(5_000));
        assert_eq!(cfg.probe_interval, Duration::from_secs(30));
        assert_eq!(cfg.stale_after, Duration::from_secs(120));
        assert_eq!(cfg.listen_addr, "0.0.0.0:3002".parse().unwrap());
        assert_eq!(cfg.fees.max_fee_per_gas, 50_000_000_000);
        assert_eq!(cfg.fees.gas_buffer_percent, 20);
        assert_eq!(cfg.confirmation.timeout, Duration::from_secs(120));
        assert!(cfg.mqtt.is_none());
        assert_eq!(cfg.signer_key.expose(), KEY);
    }

    #[test]
    fn test_each_mandatory_value_is_required() {
        for (missing, _) in mandatory() {
            let pairs: Vec<_> = mandatory().into_iter().filter(|(k, _)| *k != missing).collect();
            match build(&pairs) {
                Err(ConfigError::Missing(key)) => assert_eq!(key, missing),
                other => panic!("expected missing {missing}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut pairs = mandatory();
        pairs.push(("GRIDRELAY_MAX_RETRIES", "three"));
        assert!(matches!(build(&pairs), Err(ConfigError::Invalid { key: "GRIDRELAY_MAX_RETRIES", .. })));

        let mut pairs = mandatory();
        pairs[3] = ("GRIDRELAY_MAX_GAS_PRICE_GWEI", "0");
        assert!(matches!(build(&pairs), Err(ConfigError::Invalid { key: "GRIDRELAY_MAX_GAS_PRICE_GWEI", .. })));

        let mut pairs = mandatory();
        pairs[1] = ("GRIDRELAY_CONTRACT_ADDRESS", "0x1234");
        assert!(matches!(build(&pairs), Err(ConfigError::Invalid { key: "GRIDRELAY_CONTRACT_ADDRESS", .. })));
    }

    #[test]
    fn test_signer_key_indirection_and_redaction() {
        let mut pairs = mandatory();
        pairs[2] = ("GRIDRELAY_SIGNER_KEY", "env:RELAYER_PK");
        pairs.push(("RELAYER_PK", KEY));
        let cfg = build(&pairs).unwrap();
        assert_eq!(cfg.signer_key.expose(), KEY);
        assert!(!format!("{cfg:?}").contains("ac0974"));

        let mut pairs = mandatory();
        pairs[2] = ("GRIDRELAY_SIGNER_KEY", "env:NOT_SET");
        assert!(matches!(build(&pairs), Err(ConfigError::Invalid { key: "GRIDRELAY_SIGNER_KEY", .. })));
    }

    #[tokio::test]
    async fn test_yaml_file_with_env_override() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "rpc_url: http://node:8545\n\
             contract_address: \"0x5FbDB2315678afecb367f032d93F642f64180aa3\"\n\
             signer_key: env:RELAYER_PK\n\
             max_gas_price_gwei: 1.5\n\
             max_retries: 5\n\
             mqtt:\n  host: broker\n  port: 1884"
        )
        .unwrap();

        let mut file = load_file(tmp.path().to_str().unwrap()).await.unwrap();
        let lookup = env(&[("RELAYER_PK", KEY), ("GRIDRELAY_MAX_RETRIES", "1")]);
        file.apply_env(&lookup).unwrap();
        let cfg = RelayConfig::from_file(file, &lookup).unwrap();

        assert_eq!(cfg.rpc_url, "http://node:8545");
        assert_eq!(cfg.retry.max_retries, 1);
        assert_eq!(cfg.fees.max_fee_per_gas, 1_500_000_000);
        assert_eq!(cfg.fees.max_priority_fee_per_gas, 1_000_000_000);
        assert_eq!(cfg.mqtt, Some(MqttConf { host: "broker".into(), port: 1884 }));
    }

    #[tokio::test]
    async fn test_missing_file_is_fine_invalid_file_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("nope.yaml");
        assert!(load_file(absent.to_str().unwrap()).await.is_ok());

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "max_retries: [not, a, number]").unwrap();
        assert!(matches!(load_file(bad.to_str().unwrap()).await, Err(ConfigError::Parse { .. })));
    }
}
