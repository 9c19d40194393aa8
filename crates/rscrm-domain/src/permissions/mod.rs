//! Permission overlay and collaborator grant administration.
//!
//! Both services fail closed on reads. Writes report success as a boolean
//! (overlay) or propagate the store error (grants) so callers can tell a
//! refusal from an outage.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::error::DomainResult;
use crate::model::{CollaboratorGrant, Identity, PermissionFlags, PermissionName, ResourceType, Role};
use crate::oracle::{DecisionReason, OwnershipOracle};
use crate::traits::{GrantStore, OwnershipReader, PermissionStore, TeamReader};

/// Reads and administers the per-(user, team) permission overlay.
pub struct PermissionService<P, T> {
    store: Arc<P>,
    teams: Arc<T>,
}

impl<P, T> PermissionService<P, T>
where
    P: PermissionStore + 'static,
    T: TeamReader + 'static,
{
    pub fn new(store: Arc<P>, teams: Arc<T>) -> Self {
        Self { store, teams }
    }

    /// Returns the overlay for a user in a team.
    ///
    /// A missing row and a store error both yield all-false flags.
    pub async fn get_user_permissions(&self, user_id: &str, team_id: &str) -> PermissionFlags {
        match self.store.get_permissions(user_id, team_id).await {
            Ok(flags) => flags.unwrap_or_default(),
            Err(e) => {
                warn!(user_id, team_id, error = %e, "failed to read permission overlay");
                PermissionFlags::default()
            }
        }
    }

    /// Upserts the overlay for `(user_id, team_id)`. Returns false on store error.
    ///
    /// Performs no entitlement check; see [`Self::can_grant_permissions`].
    #[instrument(skip(self, flags))]
    pub async fn grant_permissions(
        &self,
        user_id: &str,
        team_id: &str,
        flags: &PermissionFlags,
        granted_by: &str,
    ) -> bool {
        match self
            .store
            .upsert_permissions(user_id, team_id, flags, granted_by)
            .await
        {
            Ok(()) => {
                info!("permission overlay updated");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to write permission overlay");
                false
            }
        }
    }

    /// Removes the overlay row. Returns true only if a row was removed.
    #[instrument(skip(self))]
    pub async fn revoke_permissions(&self, user_id: &str, team_id: &str) -> bool {
        match self.store.delete_permissions(user_id, team_id).await {
            Ok(removed) => {
                debug!(removed, "permission overlay revoked");
                removed
            }
            Err(e) => {
                warn!(error = %e, "failed to delete permission overlay");
                false
            }
        }
    }

    /// Checks a single overlay flag for the identity's own team.
    pub async fn has_permission(&self, identity: &Identity, permission: PermissionName) -> bool {
        if identity.is_system_admin() {
            return true;
        }
        let Some(team_id) = identity.team_id() else {
            return false;
        };
        self.get_user_permissions(identity.user_id(), team_id)
            .await
            .get(permission)
    }

    /// Decides whether `granter` may change `target_user_id`'s overlay in `team_id`.
    ///
    /// Nobody edits their own overlay. Beyond that: system admins may; brokers
    /// only for teams of their own brokerage; team owners only in their own
    /// team; anyone else only with `can_manage_team` in that team. The target
    /// must be a member of the team and must not be a broker or system admin.
    ///
    /// Store errors deny.
    pub async fn can_grant_permissions(
        &self,
        granter: &Identity,
        target_user_id: &str,
        team_id: &str,
    ) -> bool {
        match self.check_grant(granter, target_user_id, team_id).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(
                    granter = %granter.user_id(),
                    target_user_id,
                    team_id,
                    error = %e,
                    "grant entitlement check failed, denying"
                );
                false
            }
        }
    }

    async fn check_grant(
        &self,
        granter: &Identity,
        target_user_id: &str,
        team_id: &str,
    ) -> DomainResult<bool> {
        if granter.user_id() == target_user_id {
            return Ok(false);
        }
        let entitled = match granter.role() {
            Some(Role::SystemAdmin) => true,
            Some(Role::Broker) => match granter.broker_id() {
                Some(broker_id) => {
                    self.teams.get_team_broker_id(team_id).await?.as_deref() == Some(broker_id)
                }
                None => false,
            },
            Some(Role::TeamOwner) if granter.team_id() == Some(team_id) => true,
            Some(_) => {
                self.store
                    .get_permissions(granter.user_id(), team_id)
                    .await?
                    .is_some_and(|flags| flags.can_manage_team)
            }
            None => false,
        };
        if !entitled {
            debug!(granter = %granter.user_id(), team_id, "granter not entitled for team");
            return Ok(false);
        }

        let Some(target_roles) = self
            .teams
            .get_team_member_roles(target_user_id, team_id)
            .await?
        else {
            debug!(target_user_id, team_id, "target is not a member of the team");
            return Ok(false);
        };
        Ok(!target_roles.contains(Role::Broker) && !target_roles.contains(Role::SystemAdmin))
    }
}

/// Administers per-resource collaborator grants.
pub struct CollaboratorService<R, P, G> {
    oracle: Arc<OwnershipOracle<R, P, G>>,
    grants: Arc<G>,
}

impl<R, P, G> CollaboratorService<R, P, G>
where
    R: OwnershipReader + 'static,
    P: PermissionStore + 'static,
    G: GrantStore + 'static,
{
    pub fn new(oracle: Arc<OwnershipOracle<R, P, G>>, grants: Arc<G>) -> Self {
        Self { oracle, grants }
    }

    /// Creates or replaces a grant on behalf of `granter`.
    ///
    /// Returns `Ok(false)` when the granter is not entitled. The stored grant
    /// records the granter.
    #[instrument(
        skip(self, granter, grant),
        fields(granter = %granter.user_id(), resource_type = %grant.resource_type, resource_id = %grant.resource_id)
    )]
    pub async fn grant_collaborator(
        &self,
        granter: &Identity,
        grant: CollaboratorGrant,
    ) -> DomainResult<bool> {
        if !self
            .may_administer(granter, grant.resource_type, &grant.resource_id)
            .await?
        {
            debug!("granter not entitled");
            return Ok(false);
        }
        let grant = grant.granted_by(granter.user_id());
        self.grants.upsert_grant(&grant).await?;
        info!(user_id = %grant.user_id, "collaborator grant stored");
        Ok(true)
    }

    /// Removes a grant on behalf of `granter`.
    ///
    /// Returns `Ok(false)` when the granter is not entitled or no grant existed.
    #[instrument(skip(self, granter), fields(granter = %granter.user_id()))]
    pub async fn revoke_collaborator(
        &self,
        granter: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
        user_id: &str,
    ) -> DomainResult<bool> {
        if !self
            .may_administer(granter, resource_type, resource_id)
            .await?
        {
            return Ok(false);
        }
        self.grants
            .delete_grant(resource_type, resource_id, user_id)
            .await
    }

    /// Lists every grant on a resource.
    pub async fn list_collaborators(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DomainResult<Vec<CollaboratorGrant>> {
        self.grants.list_grants(resource_type, resource_id).await
    }

    /// Owners, overlay editors and system admins administer grants.
    /// Collaborators with `can_edit` do not.
    async fn may_administer(
        &self,
        granter: &Identity,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DomainResult<bool> {
        let decision = self
            .oracle
            .check_modify(granter, resource_type, resource_id)
            .await?;
        Ok(decision.allowed && decision.reason != DecisionReason::Collaborator)
    }
}
