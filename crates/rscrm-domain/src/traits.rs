//! Traits for the point reads and upserts the engine needs from storage.
//!
//! The engine never issues list queries; it only reads single rows by key.
//! Implementations live outside this crate (see the server adapters).

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::model::{CollaboratorGrant, PermissionFlags, ResourceOwnership, ResourceType, RoleSet};

/// Reads resource ownership rows and brokerage membership.
#[async_trait]
pub trait OwnershipReader: Send + Sync {
    /// Loads the ownership columns of a resource. `Ok(None)` when it does not exist.
    async fn get_resource_ownership(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DomainResult<Option<ResourceOwnership>>;

    /// Returns the brokerage a user belongs to, if any.
    async fn get_owner_broker_id(&self, user_id: &str) -> DomainResult<Option<String>>;
}

/// Reads team brokerage links and membership, for overlay administration.
#[async_trait]
pub trait TeamReader: Send + Sync {
    /// Returns the primary broker of a team. `Ok(None)` when the team is
    /// unknown or outside any brokerage.
    async fn get_team_broker_id(&self, team_id: &str) -> DomainResult<Option<String>>;

    /// Returns the roles of `user_id` if it is a member of `team_id`.
    async fn get_team_member_roles(
        &self,
        user_id: &str,
        team_id: &str,
    ) -> DomainResult<Option<RoleSet>>;
}

/// Reads and writes permission overlay rows keyed by `(user_id, team_id)`.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Loads the overlay for a user within a team. `Ok(None)` when no row exists.
    async fn get_permissions(
        &self,
        user_id: &str,
        team_id: &str,
    ) -> DomainResult<Option<PermissionFlags>>;

    /// Inserts or replaces the overlay for `(user_id, team_id)`.
    async fn upsert_permissions(
        &self,
        user_id: &str,
        team_id: &str,
        flags: &PermissionFlags,
        granted_by: &str,
    ) -> DomainResult<()>;

    /// Removes the overlay row. Returns whether a row existed.
    async fn delete_permissions(&self, user_id: &str, team_id: &str) -> DomainResult<bool>;
}

/// Reads and writes collaborator grants keyed by `(resource_type, resource_id, user_id)`.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Loads the grant for a user on a resource. `Ok(None)` when no grant exists.
    async fn get_grant(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        user_id: &str,
    ) -> DomainResult<Option<CollaboratorGrant>>;

    /// Inserts or replaces a grant by its natural key.
    async fn upsert_grant(&self, grant: &CollaboratorGrant) -> DomainResult<()>;

    /// Removes a grant. Returns whether a row existed.
    async fn delete_grant(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        user_id: &str,
    ) -> DomainResult<bool>;

    /// Lists every grant on a resource.
    async fn list_grants(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DomainResult<Vec<CollaboratorGrant>>;
}
