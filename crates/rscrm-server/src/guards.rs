//! Request guards.
//!
//! Each guard either lets a request through or produces a [`GuardRejection`]
//! carrying a stable code and the HTTP status it maps to:
//!
//! | Code              | Status |
//! |-------------------|--------|
//! | `INVALID_SCOPE`   | 400    |
//! | `FORBIDDEN_SCOPE` | 403    |
//! | `NOT_ASSOCIATED`  | 403    |
//! | `FORBIDDEN`       | 403    |
//! | `INTERNAL_ERROR`  | 500    |
//!
//! Resource guards fail closed: a store error denies with `FORBIDDEN`.

use std::fmt;

use rscrm_domain::{
    build_ownership_filter, render_postgres, DomainError, DomainResult, EffectiveScope, Identity,
    Operation, PermissionName, Predicate, RejectionCode, ResourceType, Role, ScopeRejection,
    SqlFilter, SqlOptions,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::observability::{record_decision, record_scope_rejection};
use crate::service::AuthorizationService;

/// Stable machine-readable rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardCode {
    InvalidScope,
    ForbiddenScope,
    NotAssociated,
    Forbidden,
    InternalError,
}

impl GuardCode {
    pub fn as_str(self) -> &'static str {
        match self {
            GuardCode::InvalidScope => "INVALID_SCOPE",
            GuardCode::ForbiddenScope => "FORBIDDEN_SCOPE",
            GuardCode::NotAssociated => "NOT_ASSOCIATED",
            GuardCode::Forbidden => "FORBIDDEN",
            GuardCode::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            GuardCode::InvalidScope => 400,
            GuardCode::ForbiddenScope | GuardCode::NotAssociated | GuardCode::Forbidden => 403,
            GuardCode::InternalError => 500,
        }
    }
}

impl fmt::Display for GuardCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RejectionCode> for GuardCode {
    fn from(code: RejectionCode) -> Self {
        match code {
            RejectionCode::InvalidScope => GuardCode::InvalidScope,
            RejectionCode::ForbiddenScope => GuardCode::ForbiddenScope,
            RejectionCode::NotAssociated => GuardCode::NotAssociated,
            RejectionCode::InternalError => GuardCode::InternalError,
        }
    }
}

/// A refused request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct GuardRejection {
    pub code: GuardCode,
    pub message: String,
}

impl GuardRejection {
    pub fn new(code: GuardCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(GuardCode::Forbidden, message)
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl From<ScopeRejection> for GuardRejection {
    fn from(rejection: ScopeRejection) -> Self {
        Self::new(rejection.code.into(), rejection.message)
    }
}

/// A list request that passed the scope guard.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedQuery {
    pub resource_type: ResourceType,
    pub scope: EffectiveScope,
    pub filter: Predicate,
}

impl ScopedQuery {
    /// Renders the filter as a PostgreSQL WHERE fragment.
    pub fn to_sql(&self, options: &SqlOptions) -> DomainResult<SqlFilter> {
        render_postgres(&self.filter, options)
    }
}

impl AuthorizationService {
    /// Validates a list scope and builds the matching ownership filter.
    ///
    /// A missing token falls back to the configured default scope.
    pub async fn require_scope(
        &self,
        identity: &Identity,
        token: Option<&str>,
        resource_type: ResourceType,
    ) -> Result<ScopedQuery, GuardRejection> {
        let token = token.unwrap_or(&self.settings().default_scope);

        let scope = match self.scopes().resolve_scope(token, identity).await {
            Ok(scope) => scope,
            Err(rejection) => {
                if self.settings().record_metrics {
                    record_scope_rejection(rejection.code);
                }
                return Err(rejection.into());
            }
        };

        let filter = build_ownership_filter(identity, resource_type, &scope).map_err(|e| {
            warn!(user_id = %identity.user_id(), error = %e, "filter refused a resolved scope");
            match e {
                DomainError::ScopeViolation { message, .. } => {
                    GuardRejection::new(GuardCode::ForbiddenScope, message)
                }
                other => GuardRejection::new(GuardCode::InternalError, other.to_string()),
            }
        })?;

        Ok(ScopedQuery {
            resource_type,
            scope,
            filter,
        })
    }

    /// Requires read access to a single resource.
    pub async fn require_access(
        &self,
        identity: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<(), GuardRejection> {
        let allowed = self
            .oracle()
            .can_access_resource(identity, resource_type, resource_id)
            .await;
        self.decided(Operation::View, resource_type, allowed);
        if allowed {
            Ok(())
        } else {
            Err(GuardRejection::forbidden(format!(
                "You do not have permission to access this {resource_type}"
            )))
        }
    }

    /// Requires that the caller may modify a resource they can see.
    pub async fn require_modify(
        &self,
        identity: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<(), GuardRejection> {
        self.require_access(identity, resource_type, resource_id)
            .await?;
        let allowed = self
            .oracle()
            .can_modify_resource(identity, resource_type, resource_id)
            .await;
        self.decided(Operation::Modify, resource_type, allowed);
        if allowed {
            Ok(())
        } else {
            Err(GuardRejection::forbidden(format!(
                "You do not have permission to modify this {resource_type}"
            )))
        }
    }

    /// Requires that the caller may delete a resource they can see.
    pub async fn require_delete(
        &self,
        identity: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<(), GuardRejection> {
        self.require_access(identity, resource_type, resource_id)
            .await?;
        let allowed = self
            .oracle()
            .can_delete_resource(identity, resource_type, resource_id)
            .await;
        self.decided(Operation::Delete, resource_type, allowed);
        if allowed {
            Ok(())
        } else {
            Err(GuardRejection::forbidden(format!(
                "You do not have permission to delete this {resource_type}"
            )))
        }
    }

    /// Requires an overlay flag in the caller's own team. System admins pass.
    pub async fn require_permission(
        &self,
        identity: &Identity,
        permission: PermissionName,
    ) -> Result<(), GuardRejection> {
        if self.permissions().has_permission(identity, permission).await {
            Ok(())
        } else {
            debug!(user_id = %identity.user_id(), %permission, "permission missing");
            Err(GuardRejection::forbidden(format!(
                "You do not have the required permission: {permission}"
            )))
        }
    }

    fn decided(&self, operation: Operation, resource_type: ResourceType, allowed: bool) {
        if self.settings().record_metrics {
            record_decision(operation, resource_type, allowed.into());
        }
    }
}

pub fn require_system_admin(identity: &Identity) -> Result<(), GuardRejection> {
    require_role(
        identity,
        &[Role::SystemAdmin],
        "This endpoint requires system_admin role",
    )
}

/// Brokers and system admins.
pub fn require_broker(identity: &Identity) -> Result<(), GuardRejection> {
    require_role(
        identity,
        &[Role::Broker, Role::SystemAdmin],
        "This endpoint requires broker role",
    )
}

/// Team owners, brokers and system admins.
pub fn require_team_owner(identity: &Identity) -> Result<(), GuardRejection> {
    require_role(
        identity,
        &[Role::TeamOwner, Role::Broker, Role::SystemAdmin],
        "This endpoint requires team_owner, broker, or system_admin role",
    )
}

fn require_role(
    identity: &Identity,
    allowed: &[Role],
    message: &str,
) -> Result<(), GuardRejection> {
    match identity.role() {
        Some(role) if allowed.contains(&role) => Ok(()),
        _ => Err(GuardRejection::forbidden(message)),
    }
}
