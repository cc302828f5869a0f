/**
 * API REST GRIDRELAY - Endpoint de relais anonyme + lecture d'état
 *
 * RÔLE :
 * Reçoit les votes anonymes des clients et les confie au relais de
 * transactions, puis expose l'état du service (santé, connectivité,
 * transactions suivies, statut d'un membre).
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, CORS permissif (clients navigateur)
 * - `POST /relay-vote` : validation des 4 champs avant toute interaction
 *   avec le ledger, 202 dès la soumission (pas d'attente d'inclusion)
 * - Le relais tourne dans sa propre tâche tokio : une déconnexion du client
 *   n'annule pas une écriture en cours
 * - Toute erreur remontée par le relais → 500 avec la raison la plus
 *   lisible disponible, jamais de détail interne
 */

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use gridrelay_gateway::{Address, Member, TxHash};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::connectivity::{ConnectivityMonitor, ConnectivitySnapshot};
use crate::publisher::{system_status, HealthBoard, SystemStatus};
use crate::relay::{Confirmation, RelayError, RelayRequest, TransactionRelay};
use crate::tracker::{TrackedTx, TxTracker};

const RELAY_ACCEPTED: &str = "Anonymous vote has been relayed. Transaction is pending.";
const UNKNOWN_ERROR: &str = "An unknown error occurred.";
const REQUIRED_FIELDS: [&str; 4] = ["proposalId", "voter", "support", "intensity"];

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<TransactionRelay>,
    pub tracker: TxTracker,
    pub connectivity: ConnectivityMonitor,
    pub board: HealthBoard,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/connectivity", get(get_connectivity))
        .route("/relay-vote", post(relay_vote))
        .route("/relay-vote/{tx_hash}", get(get_relayed_tx))
        .route("/members/{address}", get(get_member))
        .with_state(app_state)
        .layer(CorsLayer::permissive())
}

/// Réponse d'erreur JSON `{ "error": ... }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Raison structurée, sinon message imbriqué, sinon message générique
pub fn failure_reason(err: &RelayError) -> String {
    err.reason()
        .or_else(|| err.nested_message().map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

fn is_missing(body: &serde_json::Map<String, Value>, field: &str) -> bool {
    matches!(body.get(field), None | Some(Value::Null))
}

/// Entier positif en nombre JSON ou en chaîne décimale
fn unsigned(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Valide le corps de `/relay-vote` ; aucun appel au ledger ici
pub fn parse_relay_request(body: &Value) -> Result<RelayRequest, String> {
    let Some(fields) = body.as_object() else {
        return Err("Request body must be a JSON object".to_string());
    };

    let missing: Vec<&str> = REQUIRED_FIELDS.into_iter().filter(|f| is_missing(fields, f)).collect();
    if !missing.is_empty() {
        return Err(format!("Missing required fields: {}", missing.join(", ")));
    }

    let proposal_id = unsigned(&fields["proposalId"])
        .ok_or("Invalid field proposalId: expected a non-negative integer")?;
    let voter = fields["voter"]
        .as_str()
        .and_then(|s| Address::from_str(s.trim()).ok())
        .ok_or("Invalid field voter: expected a 20-byte hex address")?;
    let support = fields["support"]
        .as_bool()
        .ok_or("Invalid field support: expected a boolean")?;
    let intensity = unsigned(&fields["intensity"])
        .filter(|i| *i > 0)
        .ok_or("Invalid field intensity: expected a positive integer")?;

    Ok(RelayRequest { proposal_id, voter, support, intensity })
}

async fn relay_vote(
    State(app): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let request = parse_relay_request(&body).map_err(ApiError::bad_request)?;

    let relay = app.relay.clone();
    let joined = tokio::spawn(async move {
        relay.relay_anonymous_vote(request, Confirmation::Background).await
    })
    .await;

    match joined {
        Ok(Ok(outcome)) => {
            let submission = outcome.submission();
            info!(tx_hash = %submission.tx_hash, voter = %request.voter, proposal_id = request.proposal_id, "anonymous vote relayed");
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({
                    "message": RELAY_ACCEPTED,
                    "transactionHash": submission.tx_hash,
                    "requestId": submission.request_id,
                })),
            ))
        }
        Ok(Err(e)) => {
            warn!(error = %e, class = ?e.class(), "anonymous vote relay failed");
            Err(ApiError::internal(format!("Failed to relay vote: {}", failure_reason(&e))))
        }
        Err(e) => {
            error!(error = %e, "relay task aborted");
            Err(ApiError::internal(format!("Failed to relay vote: {UNKNOWN_ERROR}")))
        }
    }
}

async fn get_relayed_tx(
    State(app): State<AppState>,
    Path(tx_hash): Path<String>,
) -> Result<Json<TrackedTx>, ApiError> {
    let hash = TxHash::from_str(tx_hash.trim())
        .map_err(|_| ApiError::bad_request(format!("Invalid transaction hash: {tx_hash}")))?;
    app.tracker
        .get(&hash)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Unknown transaction: {hash}")))
}

async fn get_member(
    State(app): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Member>, ApiError> {
    let member = Address::from_str(address.trim())
        .map_err(|_| ApiError::bad_request(format!("Invalid address: {address}")))?;
    app.relay
        .member_status(member)
        .await
        .map(Json)
        .map_err(|e| {
            warn!(error = %e, "member status lookup failed");
            ApiError::internal(format!("Failed to read member status: {}", failure_reason(&e)))
        })
}

async fn get_system_health(State(app): State<AppState>) -> Json<SystemStatus> {
    Json(system_status(&app.board, &app.connectivity, &app.tracker))
}

async fn get_connectivity(State(app): State<AppState>) -> Json<ConnectivitySnapshot> {
    Json(app.connectivity.snapshot())
}
