//! Ownership oracle: point decisions for view, modify and delete.
//!
//! # Check order
//!
//! Access checks short-circuit in a fixed order. Privacy (inherited, then
//! own) runs before the role, team and collaborator rules so that a private
//! lead, or an appointment linked to one, can never be reached through
//! coarser-grained access:
//!
//! 1. system admin
//! 2. resource load (missing resources are denied)
//! 3. owner
//! 4. inherited privacy (appointment → lead)
//! 5. own privacy (lead)
//! 6. brokerage (brokers)
//! 7. team (team owners and agents)
//! 8. collaborator `can_view`
//!
//! Modify and delete do not re-run the privacy steps. Callers that gate a
//! write on read visibility must run [`OwnershipOracle::can_access_resource`]
//! first.
//!
//! # Failure handling
//!
//! The boolean API fails closed: a store error, a missing resource and a
//! logical denial all come back as `false`. Use the `check_*` methods to see
//! which rule decided.

mod types;

#[cfg(test)]
pub(crate) mod tests;

pub use types::{AccessDecision, DecisionReason};

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::DomainResult;
use crate::model::{Identity, Operation, ResourceOwnership, ResourceType, Role};
use crate::privacy::{own_visibility, PrivacyResolver};
use crate::traits::{GrantStore, OwnershipReader, PermissionStore};

/// Decides whether an identity may view, modify or delete a single resource.
pub struct OwnershipOracle<R, P, G> {
    reader: Arc<R>,
    permissions: Arc<P>,
    grants: Arc<G>,
    privacy: PrivacyResolver<R>,
}

impl<R, P, G> OwnershipOracle<R, P, G>
where
    R: OwnershipReader + 'static,
    P: PermissionStore + 'static,
    G: GrantStore + 'static,
{
    /// Creates a new oracle over the given stores.
    pub fn new(reader: Arc<R>, permissions: Arc<P>, grants: Arc<G>) -> Self {
        let privacy = PrivacyResolver::new(Arc::clone(&reader));
        Self {
            reader,
            permissions,
            grants,
            privacy,
        }
    }

    /// Returns true if the identity may view the resource.
    pub async fn can_access_resource(
        &self,
        identity: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> bool {
        let result = self.check_access(identity, resource_type, resource_id).await;
        fail_closed(Operation::View, identity, resource_type, resource_id, result)
    }

    /// Returns true if the identity may modify the resource.
    pub async fn can_modify_resource(
        &self,
        identity: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> bool {
        let result = self.check_modify(identity, resource_type, resource_id).await;
        fail_closed(Operation::Modify, identity, resource_type, resource_id, result)
    }

    /// Returns true if the identity may delete the resource.
    pub async fn can_delete_resource(
        &self,
        identity: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> bool {
        let result = self.check_delete(identity, resource_type, resource_id).await;
        fail_closed(Operation::Delete, identity, resource_type, resource_id, result)
    }

    /// Runs the access check and reports the deciding rule.
    #[instrument(
        skip(self, identity),
        fields(user_id = %identity.user_id(), resource_type = %resource_type)
    )]
    pub async fn check_access(
        &self,
        identity: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DomainResult<AccessDecision> {
        if identity.is_system_admin() {
            return Ok(AccessDecision::allow(DecisionReason::SystemAdmin));
        }

        let Some(resource) = self
            .reader
            .get_resource_ownership(resource_type, resource_id)
            .await?
        else {
            return Ok(AccessDecision::deny(DecisionReason::NotFound));
        };

        if resource.owner_id == identity.user_id() {
            return Ok(AccessDecision::allow(DecisionReason::Owner));
        }

        let inherited = self
            .privacy
            .inherited_visibility(resource_type, &resource)
            .await?;
        if inherited.hides_from(identity.user_id()) {
            debug!(resource_id, "hidden by linked private parent");
            return Ok(AccessDecision::deny(DecisionReason::InheritedPrivacy));
        }

        if own_visibility(resource_type, &resource).hides_from(identity.user_id()) {
            return Ok(AccessDecision::deny(DecisionReason::PrivateResource));
        }

        if let Some(role) = identity.role() {
            match role {
                Role::SystemAdmin => {
                    return Ok(AccessDecision::allow(DecisionReason::SystemAdmin));
                }
                Role::Broker => {
                    if self.shares_brokerage(identity, &resource).await? {
                        return Ok(AccessDecision::allow(DecisionReason::Brokerage));
                    }
                }
                Role::TeamOwner | Role::Agent => {
                    if same_team(identity.team_id(), resource.team_id.as_deref()) {
                        return Ok(AccessDecision::allow(DecisionReason::Team));
                    }
                }
            }
        }

        if self
            .collaborator_allows(identity, resource_type, resource_id, Operation::View)
            .await?
        {
            return Ok(AccessDecision::allow(DecisionReason::Collaborator));
        }

        Ok(AccessDecision::deny(DecisionReason::NoMatch))
    }

    /// Runs the modify check and reports the deciding rule.
    pub async fn check_modify(
        &self,
        identity: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DomainResult<AccessDecision> {
        self.check_write(identity, resource_type, resource_id, Operation::Modify)
            .await
    }

    /// Runs the delete check and reports the deciding rule.
    pub async fn check_delete(
        &self,
        identity: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DomainResult<AccessDecision> {
        self.check_write(identity, resource_type, resource_id, Operation::Delete)
            .await
    }

    #[instrument(
        skip(self, identity),
        fields(user_id = %identity.user_id(), resource_type = %resource_type)
    )]
    async fn check_write(
        &self,
        identity: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
        operation: Operation,
    ) -> DomainResult<AccessDecision> {
        if identity.is_system_admin() {
            return Ok(AccessDecision::allow(DecisionReason::SystemAdmin));
        }

        let Some(resource) = self
            .reader
            .get_resource_ownership(resource_type, resource_id)
            .await?
        else {
            return Ok(AccessDecision::deny(DecisionReason::NotFound));
        };

        if resource.owner_id == identity.user_id() {
            return Ok(AccessDecision::allow(DecisionReason::Owner));
        }

        // The overlay is keyed by the identity's own team, and only reaches
        // resources in that same team.
        if let Some(team_id) = identity.team_id() {
            if same_team(Some(team_id), resource.team_id.as_deref()) {
                let flags = self
                    .permissions
                    .get_permissions(identity.user_id(), team_id)
                    .await?
                    .unwrap_or_default();
                let overlay_allows = match operation {
                    Operation::Modify => flags.can_edit_team_data,
                    Operation::Delete => flags.can_delete,
                    Operation::View => false,
                };
                if overlay_allows {
                    return Ok(AccessDecision::allow(DecisionReason::TeamOverlay));
                }
            }
        }

        if self
            .collaborator_allows(identity, resource_type, resource_id, operation)
            .await?
        {
            return Ok(AccessDecision::allow(DecisionReason::Collaborator));
        }

        Ok(AccessDecision::deny(DecisionReason::NoMatch))
    }

    async fn shares_brokerage(
        &self,
        identity: &Identity,
        resource: &ResourceOwnership,
    ) -> DomainResult<bool> {
        let Some(broker_id) = identity.broker_id() else {
            return Ok(false);
        };
        let owner_broker = self.reader.get_owner_broker_id(&resource.owner_id).await?;
        Ok(owner_broker.as_deref() == Some(broker_id))
    }

    async fn collaborator_allows(
        &self,
        identity: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
        operation: Operation,
    ) -> DomainResult<bool> {
        let grant = self
            .grants
            .get_grant(resource_type, resource_id, identity.user_id())
            .await?;
        Ok(grant.is_some_and(|g| g.allows(operation)))
    }
}

/// Two optional memberships match only when both are present and equal.
fn same_team(identity_team: Option<&str>, resource_team: Option<&str>) -> bool {
    matches!((identity_team, resource_team), (Some(a), Some(b)) if a == b)
}

fn fail_closed(
    operation: Operation,
    identity: &Identity,
    resource_type: ResourceType,
    resource_id: &str,
    result: DomainResult<AccessDecision>,
) -> bool {
    match result {
        Ok(decision) => {
            debug!(
                operation = %operation,
                user_id = %identity.user_id(),
                resource_type = %resource_type,
                resource_id,
                allowed = decision.allowed,
                reason = %decision.reason,
                "ownership decision"
            );
            decision.allowed
        }
        Err(e) => {
            warn!(
                operation = %operation,
                user_id = %identity.user_id(),
                resource_type = %resource_type,
                resource_id,
                error = %e,
                "ownership check failed, denying"
            );
            false
        }
    }
}
