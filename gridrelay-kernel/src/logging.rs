//! Initialisation des logs structurés (tracing).
//!
//! `RUST_LOG` prime sur le filtre par défaut ; `LOG_FORMAT=json` produit une
//! ligne JSON par événement pour l'agrégation de logs.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "gridrelay_kernel=info,gridrelay_gateway=info,tower_http=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installe le subscriber global ; sans effet s'il existe déjà
pub fn init() -> LogFormat {
    let format = LogFormat::from_env_value(std::env::var("LOG_FORMAT").ok().as_deref());
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter()).with_target(true);
    let installed = match format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    format
}
