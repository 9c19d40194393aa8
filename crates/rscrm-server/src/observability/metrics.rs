//! Authorization metrics.
//!
//! Recorded through the `metrics` facade; `init_metrics` installs a
//! Prometheus recorder whose handle renders the exposition text.
//!
//! # Metrics Exposed
//!
//! - `rscrm_authz_decisions_total` - Guard decisions by operation, resource type, outcome
//! - `rscrm_scope_rejections_total` - Refused list scopes by rejection code
//! - `rscrm_storage_query_duration_seconds` - Storage query latency (from rscrm-storage)
//! - `rscrm_storage_health_check_duration_seconds` - Health check latency (from rscrm-storage)

use std::sync::Arc;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rscrm_domain::{Operation, RejectionCode, ResourceType};

/// Shared handle for rendering the collected metrics.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Renders the current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Error type for metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the Prometheus recorder as the global recorder.
///
/// Call once at startup, before any decision is recorded.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;

    register_default_metrics();

    Ok(MetricsState::new(handle))
}

/// Describes the metrics this service records.
pub fn register_default_metrics() {
    metrics::describe_counter!(
        "rscrm_authz_decisions_total",
        "Authorization guard decisions by operation, resource type and outcome"
    );
    metrics::describe_counter!(
        "rscrm_scope_rejections_total",
        "List scope requests refused by rejection code"
    );

    // Storage metrics (from rscrm-storage)
    metrics::describe_histogram!(
        "rscrm_storage_query_duration_seconds",
        "Storage query duration in seconds by operation, backend, and status"
    );
    metrics::describe_histogram!(
        "rscrm_storage_health_check_duration_seconds",
        "Storage health check duration in seconds by backend and status"
    );
}

/// Outcome label of a guard decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Allowed,
    Denied,
}

impl DecisionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionOutcome::Allowed => "allowed",
            DecisionOutcome::Denied => "denied",
        }
    }
}

impl From<bool> for DecisionOutcome {
    fn from(allowed: bool) -> Self {
        if allowed {
            DecisionOutcome::Allowed
        } else {
            DecisionOutcome::Denied
        }
    }
}

/// Records a single resource decision.
pub fn record_decision(operation: Operation, resource_type: ResourceType, outcome: DecisionOutcome) {
    metrics::counter!(
        "rscrm_authz_decisions_total",
        "operation" => operation.as_str(),
        "resource_type" => resource_type.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Records a refused scope request.
pub fn record_scope_rejection(code: RejectionCode) {
    metrics::counter!("rscrm_scope_rejections_total", "code" => code.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recorders are installed locally; the global recorder can only be set
    // once per process.

    /// Finds the sample line for `name` carrying every `labels` pair.
    fn sample(output: &str, name: &str, labels: &[(&str, &str)]) -> Option<String> {
        output
            .lines()
            .filter(|line| line.starts_with(&format!("{name}{{")))
            .find(|line| {
                labels
                    .iter()
                    .all(|(k, v)| line.contains(&format!("{k}=\"{v}\"")))
            })
            .and_then(|line| line.rsplit(' ').next().map(str::to_string))
    }

    #[test]
    fn test_decisions_are_counted_by_label() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let state = MetricsState::new(recorder.handle());

        metrics::with_local_recorder(&recorder, || {
            record_decision(Operation::View, ResourceType::Lead, DecisionOutcome::Denied);
            record_decision(Operation::View, ResourceType::Lead, DecisionOutcome::Denied);
            record_decision(Operation::Delete, ResourceType::Escrow, true.into());
        });

        let output = state.render();
        assert_eq!(
            sample(
                &output,
                "rscrm_authz_decisions_total",
                &[("operation", "view"), ("resource_type", "lead"), ("outcome", "denied")]
            )
            .as_deref(),
            Some("2")
        );
        assert_eq!(
            sample(
                &output,
                "rscrm_authz_decisions_total",
                &[("operation", "delete"), ("resource_type", "escrow"), ("outcome", "allowed")]
            )
            .as_deref(),
            Some("1")
        );
    }

    #[test]
    fn test_scope_rejections_are_counted_by_code() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let state = MetricsState::new(recorder.handle());

        metrics::with_local_recorder(&recorder, || {
            record_scope_rejection(RejectionCode::ForbiddenScope);
        });

        assert_eq!(
            sample(
                &state.render(),
                "rscrm_scope_rejections_total",
                &[("code", "FORBIDDEN_SCOPE")]
            )
            .as_deref(),
            Some("1")
        );
    }

    #[test]
    fn test_metrics_state_can_be_cloned() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let state = MetricsState::new(handle);
        let _cloned = state.clone();
    }
}
