//! rscrm-server: Guards, configuration and wiring
//!
//! This crate connects the storage backends to the ownership engine and
//! exposes the request guards a web layer calls:
//! - Configuration management (YAML + `RSCRM_` environment overrides)
//! - Storage adapters for the domain store traits
//! - Scope, resource, permission and role guards
//! - Structured logging and decision metrics
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                rscrm-server                 │
//! ├─────────────────────────────────────────────┤
//! │  config.rs      - Configuration management  │
//! │  adapters.rs    - DataStore → domain traits │
//! │  service.rs     - AuthorizationService      │
//! │  guards.rs      - Request guards            │
//! │  observability/ - Logging and metrics       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod config;
pub mod guards;
pub mod observability;
pub mod service;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use guards::{
    require_broker, require_system_admin, require_team_owner, GuardCode, GuardRejection,
    ScopedQuery,
};
pub use service::{AuthorizationService, ServiceError};
