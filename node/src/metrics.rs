//! # Prometheus Metrics
//!
//! Exposes operational metrics for the validator node. Scraped by
//! Prometheus at the `/metrics` HTTP endpoint on the configured metrics
//! port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it
/// can be shared across request handlers and background tasks.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Sequence of the last closed ledger.
    pub lcl_height: IntGauge,
    /// Consensus rounds completed (LCL advanced) by this node.
    pub consensus_rounds_total: IntCounter,
    /// Rounds abandoned because the network moved on without us.
    pub rounds_abandoned_total: IntCounter,
    /// Proposals this node has broadcast.
    pub proposals_sent_total: IntCounter,
    /// Validations this node has broadcast.
    pub validations_sent_total: IntCounter,
    /// Ledger acquisitions currently in flight.
    pub active_acquisitions: IntGauge,
    /// Peer reply timeouts accumulated across all acquisitions.
    pub acquire_timeouts_total: IntGauge,
    /// Decayed average of completed ledger fetches per minute.
    pub ledger_fetch_rate: Gauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("pulsar".into()), None)
            .expect("failed to create prometheus registry");

        let lcl_height = IntGauge::new("lcl_height", "Sequence of the last closed ledger")
            .expect("metric creation");
        registry
            .register(Box::new(lcl_height.clone()))
            .expect("metric registration");

        let consensus_rounds_total = IntCounter::new(
            "consensus_rounds_total",
            "Consensus rounds completed (LCL advanced)",
        )
        .expect("metric creation");
        registry
            .register(Box::new(consensus_rounds_total.clone()))
            .expect("metric registration");

        let rounds_abandoned_total = IntCounter::new(
            "rounds_abandoned_total",
            "Rounds abandoned because the network moved on without us",
        )
        .expect("metric creation");
        registry
            .register(Box::new(rounds_abandoned_total.clone()))
            .expect("metric registration");

        let proposals_sent_total =
            IntCounter::new("proposals_sent_total", "Proposals broadcast by this node")
                .expect("metric creation");
        registry
            .register(Box::new(proposals_sent_total.clone()))
            .expect("metric registration");

        let validations_sent_total = IntCounter::new(
            "validations_sent_total",
            "Validations broadcast by this node",
        )
        .expect("metric creation");
        registry
            .register(Box::new(validations_sent_total.clone()))
            .expect("metric registration");

        let active_acquisitions = IntGauge::new(
            "active_acquisitions",
            "Ledger acquisitions currently in flight",
        )
        .expect("metric creation");
        registry
            .register(Box::new(active_acquisitions.clone()))
            .expect("metric registration");

        let acquire_timeouts_total = IntGauge::new(
            "acquire_timeouts_total",
            "Peer reply timeouts accumulated across all acquisitions",
        )
        .expect("metric creation");
        registry
            .register(Box::new(acquire_timeouts_total.clone()))
            .expect("metric registration");

        let ledger_fetch_rate = Gauge::new(
            "ledger_fetch_rate",
            "Decayed average of completed ledger fetches per minute",
        )
        .expect("metric creation");
        registry
            .register(Box::new(ledger_fetch_rate.clone()))
            .expect("metric registration");

        Self {
            registry,
            lcl_height,
            consensus_rounds_total,
            rounds_abandoned_total,
            proposals_sent_total,
            validations_sent_total,
            active_acquisitions,
            acquire_timeouts_total,
            ledger_fetch_rate,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition
    /// format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers via extension.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_encode() {
        let metrics = NodeMetrics::new();
        metrics.lcl_height.set(42);
        metrics.proposals_sent_total.inc();

        let text = metrics.encode().expect("encode");
        assert!(text.contains("pulsar_lcl_height 42"));
        assert!(text.contains("pulsar_proposals_sent_total 1"));
    }
}
