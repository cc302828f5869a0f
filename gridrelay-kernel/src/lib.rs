/**
 * GRIDRELAY KERNEL - Service de relais de transactions pour le DAO énergétique
 *
 * RÔLE : Soumission fiable des écritures on-chain (retry, buffer de gas,
 * confirmation), surveillance de la connectivité au ledger, santé systémique
 * de la communauté et endpoint de vote anonyme.
 *
 * ARCHITECTURE : un `TransactionRelay` partagé par `Arc`, des tâches tokio de
 * fond (sonde, recalcul de santé, publication MQTT) et une API Axum.
 */

pub mod config;
pub mod connectivity;
pub mod health;
pub mod http;
pub mod logging;
pub mod publisher;
pub mod relay;
pub mod retry;
pub mod tracker;
