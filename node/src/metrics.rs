//! # Prometheus Metrics
//!
//! Operational metrics for the orchestrator: lifecycle calls issued, relay
//! deliveries, duplicates and retries, and how deep each outbox is. Served
//! at `/metrics` when the demo runs with `--metrics-port`.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Lifecycle calls issued, by operation.
    pub lifecycle_ops_total: IntCounterVec,
    /// Lifecycle calls the registry rejected, by operation.
    pub lifecycle_rejections_total: IntCounterVec,
    /// Relay messages applied by a counterpart registry.
    pub relay_delivered_total: IntCounter,
    /// Deliveries the counterpart recognised as already applied.
    pub relay_duplicates_total: IntCounter,
    /// Deliveries held back behind a sequence gap.
    pub relay_buffered_total: IntCounter,
    /// Failed delivery attempts that were retried.
    pub relay_retries_total: IntCounter,
    /// Unacknowledged messages per source chain.
    pub outbox_depth: IntGaugeVec,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("bridgelend".into()), None)?;

        let lifecycle_ops_total = IntCounterVec::new(
            Opts::new("lifecycle_ops_total", "Loan lifecycle calls issued"),
            &["op"],
        )?;
        registry.register(Box::new(lifecycle_ops_total.clone()))?;

        let lifecycle_rejections_total = IntCounterVec::new(
            Opts::new(
                "lifecycle_rejections_total",
                "Loan lifecycle calls rejected by the registry",
            ),
            &["op"],
        )?;
        registry.register(Box::new(lifecycle_rejections_total.clone()))?;

        let relay_delivered_total = IntCounter::new(
            "relay_delivered_total",
            "Relay messages applied by the counterpart registry",
        )?;
        registry.register(Box::new(relay_delivered_total.clone()))?;

        let relay_duplicates_total = IntCounter::new(
            "relay_duplicates_total",
            "Relay deliveries recognised as duplicates",
        )?;
        registry.register(Box::new(relay_duplicates_total.clone()))?;

        let relay_buffered_total = IntCounter::new(
            "relay_buffered_total",
            "Relay deliveries buffered behind a sequence gap",
        )?;
        registry.register(Box::new(relay_buffered_total.clone()))?;

        let relay_retries_total =
            IntCounter::new("relay_retries_total", "Relay delivery attempts that were retried")?;
        registry.register(Box::new(relay_retries_total.clone()))?;

        let outbox_depth = IntGaugeVec::new(
            Opts::new("outbox_depth", "Unacknowledged relay messages per source chain"),
            &["chain"],
        )?;
        registry.register(Box::new(outbox_depth.clone()))?;

        Ok(Self {
            registry,
            lifecycle_ops_total,
            lifecycle_rejections_total,
            relay_delivered_total,
            relay_duplicates_total,
            relay_buffered_total,
            relay_retries_total,
            outbox_depth,
        })
    }

    /// Counts one lifecycle call and, if it failed, one rejection.
    pub fn observe_lifecycle<T, E>(&self, op: &str, result: &Result<T, E>) {
        self.lifecycle_ops_total.with_label_values(&[op]).inc();
        if result.is_err() {
            self.lifecycle_rejections_total.with_label_values(&[op]).inc();
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers via state.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Builds the router that serves `/metrics`.
pub fn router(metrics: SharedMetrics) -> axum::Router {
    axum::Router::new()
        .route("/metrics", axum::routing::get(metrics_handler))
        .with_state(metrics)
}

/// Axum handler that renders `/metrics` in Prometheus text format.
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
