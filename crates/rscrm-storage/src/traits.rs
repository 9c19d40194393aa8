//! DataStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{HealthStatus, StorageError, StorageResult};

/// Tables holding ownership-bearing CRM resources.
pub const RESOURCE_TABLES: [&str; 5] = ["escrows", "clients", "listings", "leads", "appointments"];

/// Tables that carry an `is_private` column.
const PRIVACY_TABLES: [&str; 1] = ["leads"];

/// Tables that carry a `lead_id` column.
const LEAD_LINKED_TABLES: [&str; 1] = ["appointments"];

/// Maximum length of any identifier accepted by the store.
const MAX_ID_LENGTH: usize = 255;

/// Ownership columns of a resource row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResource {
    pub id: String,
    pub owner_id: String,
    pub team_id: Option<String>,
    /// Only populated for tables with a privacy column.
    pub is_private: Option<bool>,
    /// Only populated for tables linked to a lead.
    pub lead_id: Option<String>,
}

/// A user's memberships, as far as ownership checks are concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub id: String,
    pub broker_id: Option<String>,
    pub team_id: Option<String>,
    /// Role name as stored by the CRM (`agent`, `team_owner`, ...).
    pub role: Option<String>,
}

/// A `teams` row, reduced to its brokerage link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTeam {
    pub id: String,
    pub primary_broker_id: Option<String>,
}

/// A `user_permissions` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPermissions {
    pub user_id: String,
    pub team_id: String,
    pub can_delete: bool,
    pub can_edit_team_data: bool,
    pub can_view_financials: bool,
    pub can_manage_team: bool,
    pub is_broker_admin: bool,
    pub is_team_admin: bool,
    pub granted_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A `data_access_control` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredGrant {
    pub resource_type: String,
    pub resource_id: String,
    pub user_id: String,
    pub can_view: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub granted_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Abstract storage interface for ownership data.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations. Every method is a point read or a keyed write.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    // Resource operations

    /// Loads the ownership columns of a resource.
    ///
    /// Returns `StorageError::ResourceNotFound` when the row does not exist.
    async fn get_resource(&self, table: &str, id: &str) -> StorageResult<StoredResource>;

    /// Returns the brokerage of a user. `Ok(None)` for unknown users and
    /// users outside any brokerage.
    async fn get_user_broker(&self, user_id: &str) -> StorageResult<Option<String>>;

    // Team membership operations

    /// Returns the primary broker of a team. `Ok(None)` for unknown teams and
    /// teams outside any brokerage.
    async fn get_team_broker(&self, team_id: &str) -> StorageResult<Option<String>>;

    /// Loads a user only if it belongs to `team_id`.
    async fn get_team_member(
        &self,
        user_id: &str,
        team_id: &str,
    ) -> StorageResult<Option<StoredUser>>;

    // Permission overlay operations

    /// Loads the overlay row for `(user_id, team_id)`.
    async fn get_permissions(
        &self,
        user_id: &str,
        team_id: &str,
    ) -> StorageResult<Option<StoredPermissions>>;

    /// Inserts or replaces the overlay row keyed by `(user_id, team_id)`.
    async fn upsert_permissions(&self, permissions: StoredPermissions) -> StorageResult<()>;

    /// Deletes the overlay row. Returns whether a row existed.
    async fn delete_permissions(&self, user_id: &str, team_id: &str) -> StorageResult<bool>;

    // Collaborator grant operations

    /// Loads the grant for a user on a resource.
    async fn get_grant(
        &self,
        resource_type: &str,
        resource_id: &str,
        user_id: &str,
    ) -> StorageResult<Option<StoredGrant>>;

    /// Inserts or replaces a grant keyed by `(resource_type, resource_id, user_id)`.
    async fn upsert_grant(&self, grant: StoredGrant) -> StorageResult<()>;

    /// Deletes a grant. Returns whether a row existed.
    async fn delete_grant(
        &self,
        resource_type: &str,
        resource_id: &str,
        user_id: &str,
    ) -> StorageResult<bool>;

    /// Lists grants on a resource, ordered by user ID.
    async fn list_grants(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> StorageResult<Vec<StoredGrant>>;

    /// Checks backend connectivity.
    async fn health_check(&self) -> StorageResult<HealthStatus>;
}

/// Rejects tables outside the resource allow-list.
///
/// Table names are interpolated into SQL, so only the fixed list passes.
pub fn validate_resource_table(table: &str) -> StorageResult<()> {
    if RESOURCE_TABLES.contains(&table) {
        Ok(())
    } else {
        Err(StorageError::InvalidInput {
            message: format!("unknown resource table '{table}'"),
        })
    }
}

pub fn table_has_privacy_flag(table: &str) -> bool {
    PRIVACY_TABLES.contains(&table)
}

pub fn table_has_lead_link(table: &str) -> bool {
    LEAD_LINKED_TABLES.contains(&table)
}

/// Validates an identifier used as (part of) a key.
pub fn validate_id(field: &str, value: &str) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::InvalidInput {
            message: format!("{field} cannot be empty"),
        });
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!("{field} exceeds {MAX_ID_LENGTH} characters"),
        });
    }
    Ok(())
}

pub fn validate_grant(grant: &StoredGrant) -> StorageResult<()> {
    validate_id("resource_type", &grant.resource_type)?;
    validate_id("resource_id", &grant.resource_id)?;
    validate_id("user_id", &grant.user_id)
}

pub fn validate_permissions(permissions: &StoredPermissions) -> StorageResult<()> {
    validate_id("user_id", &permissions.user_id)?;
    validate_id("team_id", &permissions.team_id)
}
