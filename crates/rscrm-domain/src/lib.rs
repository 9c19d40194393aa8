//! rscrm-domain: Ownership and authorization logic for CRM resources
//!
//! This crate decides, for every read, modify and delete on every CRM
//! resource type, whether a verified identity may act:
//! - Role hierarchy and permission overlay model
//! - Privacy inheritance (appointment → lead)
//! - Point decisions through the ownership oracle
//! - Scope resolution and list filters (in-memory and PostgreSQL)
//! - Overlay and collaborator grant administration
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   rscrm-domain                   │
//! ├──────────────────────────────────────────────────┤
//! │  model/       - Roles, identities, resources     │
//! │  privacy/     - Privacy inheritance resolver     │
//! │  oracle/      - can_access / modify / delete     │
//! │  scope/       - Scope tokens → effective scope   │
//! │  filter/      - Predicates & SQL rendering       │
//! │  permissions/ - Overlay & collaborator admin     │
//! │  traits       - Store seams                      │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod filter;
pub mod model;
pub mod oracle;
pub mod permissions;
pub mod privacy;
pub mod scope;
pub mod traits;

// Re-export commonly used types at the crate root
pub use error::{DomainError, DomainResult};
pub use filter::{build_ownership_filter, render_postgres, Predicate, ResourceRow, SqlFilter, SqlOptions};
pub use model::{
    CollaboratorGrant, Identity, Operation, PermissionFlags, PermissionName, ResourceOwnership,
    ResourceType, Role, RoleSet, Scope,
};
pub use oracle::{AccessDecision, DecisionReason, OwnershipOracle};
pub use permissions::{CollaboratorService, PermissionService};
pub use scope::{default_scope, EffectiveScope, RejectionCode, ScopeRejection, ScopeResolver};
pub use traits::{GrantStore, OwnershipReader, PermissionStore, TeamReader};
