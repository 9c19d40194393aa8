//! Scope resolution for list queries.
//!
//! A requested scope token is normalised and checked against the identity's
//! effective role before any data is touched. The result, [`EffectiveScope`],
//! can only be produced here, so the filter builder never sees an unchecked
//! scope from outside this crate.
//!
//! | Role                 | Reachable scopes                                   |
//! |----------------------|----------------------------------------------------|
//! | `system_admin`       | user, team, brokerage, all                         |
//! | `broker`             | user, team, brokerage                              |
//! | `team_owner`/`agent` | user, team (brokerage with the `is_broker_admin` overlay) |

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{Identity, Role, Scope};
use crate::traits::PermissionStore;

/// A scope that has been validated for a specific identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveScope {
    scope: Scope,
    elevated: bool,
    user_id: String,
}

impl EffectiveScope {
    pub(crate) fn new(scope: Scope, elevated: bool, user_id: impl Into<String>) -> Self {
        Self {
            scope,
            elevated,
            user_id: user_id.into(),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// The user the scope was resolved for.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// True when brokerage reach comes from the `is_broker_admin` overlay
    /// rather than from the broker role.
    pub fn is_overlay_elevated(&self) -> bool {
        self.elevated
    }
}

/// Machine-readable reason a scope was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionCode {
    /// The token is not a known scope.
    InvalidScope,
    /// The role cannot reach the scope.
    ForbiddenScope,
    /// The scope needs a team or brokerage the identity does not belong to.
    NotAssociated,
    /// The overlay could not be read.
    InternalError,
}

impl RejectionCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionCode::InvalidScope => "INVALID_SCOPE",
            RejectionCode::ForbiddenScope => "FORBIDDEN_SCOPE",
            RejectionCode::NotAssociated => "NOT_ASSOCIATED",
            RejectionCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scope request that was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ScopeRejection {
    pub code: RejectionCode,
    pub message: String,
}

impl ScopeRejection {
    fn new(code: RejectionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn not_associated_with_team() -> Self {
        Self::new(
            RejectionCode::NotAssociated,
            "user is not associated with a team",
        )
    }

    fn not_associated_with_broker() -> Self {
        Self::new(
            RejectionCode::NotAssociated,
            "user is not associated with a broker",
        )
    }
}

/// The scope a role lands on when the caller does not ask for one.
pub fn default_scope(role: Role) -> Scope {
    match role {
        Role::SystemAdmin => Scope::All,
        Role::Broker => Scope::Brokerage,
        Role::TeamOwner | Role::Agent => Scope::Team,
    }
}

/// Validates requested scopes against role, memberships and the overlay.
pub struct ScopeResolver<P> {
    permissions: Arc<P>,
}

impl<P> ScopeResolver<P>
where
    P: PermissionStore + 'static,
{
    pub fn new(permissions: Arc<P>) -> Self {
        Self { permissions }
    }

    /// Resolves a raw scope token for an identity.
    ///
    /// Unknown tokens are rejected without reading any store. Only agents and
    /// team owners asking for `brokerage` or `all` cost an overlay read.
    pub async fn resolve_scope(
        &self,
        token: &str,
        identity: &Identity,
    ) -> Result<EffectiveScope, ScopeRejection> {
        let Some(scope) = Scope::from_token(token) else {
            return Err(ScopeRejection::new(
                RejectionCode::InvalidScope,
                format!("invalid scope '{token}', must be one of: my, user, team, brokerage, all"),
            ));
        };

        let Some(role) = identity.role() else {
            return Err(ScopeRejection::new(
                RejectionCode::ForbiddenScope,
                "invalid user role",
            ));
        };

        let resolved = match role {
            Role::SystemAdmin => Ok(EffectiveScope::new(scope, false, identity.user_id())),
            Role::Broker => resolve_for_broker(scope, identity),
            Role::TeamOwner | Role::Agent => self.resolve_for_member(scope, role, identity).await,
        };

        match &resolved {
            Ok(effective) => debug!(
                user_id = %identity.user_id(),
                role = %role,
                scope = %effective.scope(),
                elevated = effective.is_overlay_elevated(),
                "scope resolved"
            ),
            Err(rejection) => debug!(
                user_id = %identity.user_id(),
                role = %role,
                code = %rejection.code,
                "scope rejected"
            ),
        }
        resolved
    }

    async fn resolve_for_member(
        &self,
        scope: Scope,
        role: Role,
        identity: &Identity,
    ) -> Result<EffectiveScope, ScopeRejection> {
        match scope {
            Scope::User => Ok(EffectiveScope::new(scope, false, identity.user_id())),
            Scope::Team => {
                if identity.team_id().is_none() {
                    return Err(ScopeRejection::not_associated_with_team());
                }
                Ok(EffectiveScope::new(scope, false, identity.user_id()))
            }
            Scope::Brokerage | Scope::All => {
                if !self.holds_broker_admin(identity).await? {
                    return Err(ScopeRejection::new(
                        RejectionCode::ForbiddenScope,
                        format!(
                            "only brokers and system_admin can access '{scope}' scope, \
                             {role} needs the is_broker_admin permission"
                        ),
                    ));
                }
                if scope == Scope::All {
                    return Err(ScopeRejection::new(
                        RejectionCode::ForbiddenScope,
                        "only system_admin can access 'all' scope",
                    ));
                }
                if identity.broker_id().is_none() {
                    return Err(ScopeRejection::not_associated_with_broker());
                }
                Ok(EffectiveScope::new(scope, true, identity.user_id()))
            }
        }
    }

    async fn holds_broker_admin(&self, identity: &Identity) -> Result<bool, ScopeRejection> {
        // The overlay is keyed by team; without one there is nothing to read.
        let Some(team_id) = identity.team_id() else {
            return Ok(false);
        };
        match self
            .permissions
            .get_permissions(identity.user_id(), team_id)
            .await
        {
            Ok(flags) => Ok(flags.is_some_and(|f| f.is_broker_admin)),
            Err(e) => {
                warn!(
                    user_id = %identity.user_id(),
                    team_id,
                    error = %e,
                    "failed to read permission overlay during scope resolution"
                );
                Err(ScopeRejection::new(
                    RejectionCode::InternalError,
                    "failed to verify scope permissions",
                ))
            }
        }
    }
}

/// Brokers reach `team` whatever their membership; a teamless broker's team
/// filter matches nothing.
fn resolve_for_broker(scope: Scope, identity: &Identity) -> Result<EffectiveScope, ScopeRejection> {
    match scope {
        Scope::User | Scope::Team => Ok(EffectiveScope::new(scope, false, identity.user_id())),
        Scope::Brokerage => {
            if identity.broker_id().is_none() {
                return Err(ScopeRejection::not_associated_with_broker());
            }
            Ok(EffectiveScope::new(scope, false, identity.user_id()))
        }
        Scope::All => Err(ScopeRejection::new(
            RejectionCode::ForbiddenScope,
            "only system_admin can access 'all' scope",
        )),
    }
}
