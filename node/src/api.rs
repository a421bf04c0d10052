//! # HTTP Status API
//!
//! Builds the axum router that exposes the validator node's HTTP
//! interface. All endpoints share application state through axum's
//! `State` extractor and read live consensus structures directly; there
//! is no snapshotting layer to fall out of date.
//!
//! ## Endpoints
//!
//! | Method | Path          | Description                      |
//! |--------|---------------|----------------------------------|
//! | GET    | `/health`     | Liveness probe                   |
//! | GET    | `/status`     | Node + consensus status summary  |
//! | GET    | `/validators` | The UNL as currently configured  |

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use pulsar_protocol::network::acquire::InboundLedgers;
use pulsar_protocol::storage::history::LedgerHistory;
use pulsar_protocol::validators::unl::TrustedValidators;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network identifier (e.g., "devnet", "testnet", "mainnet").
    pub network: String,
    /// This validator's public key, hex-encoded.
    pub node_id: String,
    /// When the node started, for uptime reporting.
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Ledger history (LCL pointer and headers).
    pub history: Arc<LedgerHistory>,
    /// The trusted validator list.
    pub unl: Arc<TrustedValidators>,
    /// The inbound-ledger acquirer, for fetch telemetry.
    pub acquirer: Arc<InboundLedgers>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// The `/status` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub node_id: String,
    pub lcl_seq: u32,
    pub lcl_hash: String,
    pub lcl_close_time: u64,
    pub validators: usize,
    pub quorum: u32,
    pub active_acquisitions: usize,
    pub acquire_timeouts: u64,
    pub fetch_rate_per_min: f64,
    pub uptime_secs: i64,
    pub timestamp: String,
}

/// One `/validators` entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidatorEntry {
    pub master_key: String,
    pub label: String,
    /// The signing key currently bound by manifest; absent if revoked.
    pub signing_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Builds the API router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/validators", get(validators_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Liveness probe. If this answers, the process is alive; nothing more.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Node and consensus status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let lcl = state.history.lcl();
    let (active, timeouts) = state.acquirer.fetch_counts();
    let now = chrono::Utc::now();

    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        node_id: state.node_id.clone(),
        lcl_seq: lcl.seq(),
        lcl_hash: lcl.header.hash_hex(),
        lcl_close_time: lcl.header.close_time,
        validators: state.unl.len(),
        quorum: state.unl.quorum(),
        active_acquisitions: active,
        acquire_timeouts: timeouts,
        fetch_rate_per_min: state.acquirer.fetch_rate(),
        uptime_secs: (now - state.started_at).num_seconds(),
        timestamp: now.to_rfc3339(),
    })
}

/// The UNL as currently configured, including manifest rotation state.
async fn validators_handler(State(state): State<AppState>) -> impl IntoResponse {
    let entries: Vec<ValidatorEntry> = state
        .unl
        .entries()
        .into_iter()
        .map(|(master, label, signing)| ValidatorEntry {
            master_key: master.to_hex(),
            label,
            signing_key: signing.map(|k| k.to_hex()),
        })
        .collect();
    Json(entries)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use pulsar_protocol::consensus::clock::{Clock, WallClock};
    use pulsar_protocol::crypto::keys::PulsarKeypair;
    use pulsar_protocol::storage::node_store::MemoryStore;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        let clock: Arc<dyn Clock> = Arc::new(WallClock::new());
        let history = Arc::new(LedgerHistory::new());
        let unl = TrustedValidators::shared();
        unl.add(PulsarKeypair::generate().public_key(), "validator-0");
        let acquirer = Arc::new(InboundLedgers::new(
            clock,
            history.clone(),
            Arc::new(MemoryStore::new()),
        ));

        AppState {
            version: "test".to_string(),
            network: "devnet".to_string(),
            node_id: "00".repeat(32),
            started_at: chrono::Utc::now(),
            history,
            unl,
            acquirer,
            metrics: Arc::new(NodeMetrics::new()),
        }
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let router = create_router(test_state());
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reports_genesis_lcl() {
        let router = create_router(test_state());
        let response = router
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let status: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(status.lcl_seq, 0);
        assert_eq!(status.network, "devnet");
        assert_eq!(status.validators, 1);
        assert_eq!(status.quorum, 1);
    }

    #[tokio::test]
    async fn validators_lists_the_unl() {
        let router = create_router(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/validators")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let entries: Vec<ValidatorEntry> = serde_json::from_slice(&body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label, "validator-0");
        assert!(entries[0].signing_key.is_some());
    }
}
