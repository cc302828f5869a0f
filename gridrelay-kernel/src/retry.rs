/**
 * RETRY / BACKOFF - Nouvelle tentative des écritures on-chain
 *
 * RÔLE :
 * Enveloppe une opération asynchrone, classe chaque échec et décide s'il faut
 * retenter. Délai fixe entre deux tentatives, au plus `max_retries + 1` essais.
 *
 * FONCTIONNEMENT :
 * - Classification : validation, réseau transitoire, nonce/fee, revert
 * - Seuls réseau et nonce/fee sont retentés ; le reste remonte au 1er essai
 * - Compteur local à chaque appel de `run` : deux appels concurrents ne se
 *   partagent jamais leurs tentatives
 * - Le délai n'endort que l'appel concerné (tokio::time::sleep)
 *
 * RISQUE CONNU :
 * Retenter une écriture qui a déjà atteint le mempool repose sur le rejet par
 * le ledger de la resoumission (nonce déjà utilisé).
 */

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use gridrelay_gateway::GatewayError;
use serde::Serialize;
use tracing::{info, warn};

/// Famille d'erreur, qui détermine la réaction du contrôleur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Entrée refusée : jamais retentée
    Validation,
    /// Réseau / nœud indisponible : retentée
    Transient,
    /// Nonce ou fee rejetés par le nœud : retentée (le filler relit le nonce)
    NonceFee,
    /// Exécution refusée par le contrat : terminale
    Revert,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Transient | ErrorClass::NonceFee)
    }
}

/// Type d'erreur que le contrôleur sait classer
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

const NONCE_FEE_PATTERNS: &[&str] = &[
    "nonce too low",
    "nonce too high",
    "replacement transaction underpriced",
    "insufficient gas",
    "intrinsic gas too low",
    "max fee per gas less than block base fee",
    "transaction underpriced",
];

/// Le nœud détient déjà cette transaction signée : la resoumettre créerait un doublon
const DUPLICATE_PATTERNS: &[&str] = &["already known", "known transaction"];

const TRANSIENT_PATTERNS: &[&str] = &[
    "network error",
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "connection closed",
    "error sending request",
    "service unavailable",
    "too many requests",
    "rate limit",
    "header not found",
];

fn matches_any(message: &str, patterns: &[&str]) -> bool {
    let message = message.to_ascii_lowercase();
    patterns.iter().any(|p| message.contains(p))
}

impl Classify for GatewayError {
    fn class(&self) -> ErrorClass {
        match self {
            GatewayError::Reverted { .. } => ErrorClass::Revert,
            GatewayError::Transport(msg) | GatewayError::Rpc { message: msg, .. }
                if matches_any(msg, DUPLICATE_PATTERNS) =>
            {
                ErrorClass::Validation
            }
            GatewayError::Transport(msg) => {
                if matches_any(msg, NONCE_FEE_PATTERNS) {
                    ErrorClass::NonceFee
                } else {
                    ErrorClass::Transient
                }
            }
            GatewayError::Rpc { message, .. } => {
                if matches_any(message, NONCE_FEE_PATTERNS) {
                    ErrorClass::NonceFee
                } else if matches_any(message, TRANSIENT_PATTERNS) {
                    ErrorClass::Transient
                } else if matches_any(message, &["revert"]) {
                    ErrorClass::Revert
                } else {
                    ErrorClass::Validation
                }
            }
            GatewayError::Decode(_) | GatewayError::InvalidKey(_) | GatewayError::InvalidUrl(_) => {
                ErrorClass::Validation
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, delay: Duration::from_millis(5_000) }
    }
}

/// Succès, avec le nombre de tentatives consommées
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Échec final : la dernière erreur, intacte
#[derive(Debug)]
pub struct Exhausted<E> {
    pub error: E,
    pub attempts: u32,
    pub class: ErrorClass,
}

impl RetryPolicy {
    /// Exécute `op(attempt)` (attempt commence à 1) jusqu'au succès, à une
    /// erreur non retentable, ou à l'épuisement des tentatives.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<Retried<T>, Exhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation, attempts = attempt, "succeeded after retry");
                    }
                    return Ok(Retried { value, attempts: attempt });
                }
                Err(error) => {
                    let class = error.class();
                    if !class.is_retryable() {
                        return Err(Exhausted { error, attempts: attempt, class });
                    }
                    if attempt > self.max_retries {
                        warn!(operation, attempts = attempt, ?class, %error, "retries exhausted");
                        return Err(Exhausted { error, attempts: attempt, class });
                    }
                    warn!(
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        ?class,
                        %error,
                        delay_ms = self.delay.as_millis() as u64,
                        "retryable failure, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy { max_retries, delay: Duration::from_secs(5) }
    }

    #[test]
    fn test_classification() {
        let transport = GatewayError::Transport("error sending request: connection refused".into());
        assert_eq!(transport.class(), ErrorClass::Transient);

        let nonce = GatewayError::Rpc { code: -32000, message: "nonce too low".into(), data: None };
        assert_eq!(nonce.class(), ErrorClass::NonceFee);

        let underpriced = GatewayError::Rpc {
            code: -32000,
            message: "replacement transaction underpriced".into(),
            data: None,
        };
        assert_eq!(underpriced.class(), ErrorClass::NonceFee);

        let known = GatewayError::Rpc { code: -32000, message: "already known".into(), data: None };
        assert_eq!(known.class(), ErrorClass::Validation);
        assert!(!known.class().is_retryable());

        let funds = GatewayError::Rpc { code: -32000, message: "insufficient funds for transfer".into(), data: None };
        assert_eq!(funds.class(), ErrorClass::Validation);

        let reverted = GatewayError::Reverted { reason: "Member suspended".into() };
        assert_eq!(reverted.class(), ErrorClass::Revert);
        assert!(!ErrorClass::Revert.is_retryable());
        assert!(ErrorClass::NonceFee.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_error_uses_all_attempts_and_n_delays() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();

        let result: Result<Retried<()>, _> = policy(3)
            .run("reportEnergyProduction", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Transport("timeout".into()))
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(exhausted.attempts, 4);
        assert_eq!(exhausted.class, ErrorClass::Transient);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_single_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();

        let result: Result<Retried<()>, _> = policy(3)
            .run("voteQuadratic", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Reverted { reason: "Voting period ended".into() })
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(exhausted.error, GatewayError::Reverted { reason: "Voting period ended".into() });
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let result = policy(3)
            .run("transferCredits", |attempt| async move {
                if attempt < 3 {
                    Err(GatewayError::Rpc { code: -32000, message: "nonce too low".into(), data: None })
                } else {
                    Ok(attempt)
                }
            })
            .await
            .unwrap();

        assert_eq!(result.value, 3);
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_one_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<Retried<()>, _> = policy(0)
            .run("registerMember", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Transport("network error".into()))
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
