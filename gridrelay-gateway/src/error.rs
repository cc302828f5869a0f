/// Erreurs possibles lors d'un échange avec le nœud RPC ou le contrat.
/// Les messages du nœud sont conservés mot pour mot : la classification
/// (réseau, nonce/fee, revert) se fait en aval, dans le kernel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Échec de transport (timeout, connexion refusée, HTTP 5xx...)
    #[error("network error: {0}")]
    Transport(String),
    /// Le nœud a répondu avec une erreur JSON-RPC
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },
    /// Le contrat a rejeté l'appel (revert à l'estimation ou à l'exécution)
    #[error("execution reverted: {reason}")]
    Reverted { reason: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    #[error("invalid rpc url: {0}")]
    InvalidUrl(String),
}

impl GatewayError {
    /// Raison structurée fournie par le contrat, si disponible
    pub fn reason(&self) -> Option<&str> {
        match self {
            GatewayError::Reverted { reason } if !reason.is_empty() => Some(reason),
            _ => None,
        }
    }

    /// Message brut de l'erreur sous-jacente (sans préfixe de variante)
    pub fn message(&self) -> &str {
        match self {
            GatewayError::Transport(msg)
            | GatewayError::Decode(msg)
            | GatewayError::InvalidKey(msg)
            | GatewayError::InvalidUrl(msg) => msg,
            GatewayError::Rpc { message, .. } => message,
            GatewayError::Reverted { reason } => reason,
        }
    }
}

/// Extrait la raison d'un message du type `execution reverted: Member suspended`
pub(crate) fn revert_reason(message: &str) -> String {
    match message.split_once("reverted:") {
        Some((_, reason)) => reason.trim().to_string(),
        None => String::new(),
    }
}
