//! Observability infrastructure for rscrm.
//!
//! This module provides:
//! - Structured logging configuration
//! - Authorization decision metrics

mod logging;
mod metrics;

pub use logging::{create_json_layer, init_logging, LoggingConfig};
pub use metrics::{
    init_metrics, record_decision, record_scope_rejection, register_default_metrics,
    DecisionOutcome, MetricsError, MetricsState,
};
