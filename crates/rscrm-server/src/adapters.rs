//! Adapters that bridge the storage layer to the domain layer.
//!
//! The domain layer (rscrm-domain) defines abstract seams for data access:
//! - `OwnershipReader`: resource ownership rows and user brokerage
//! - `PermissionStore`: permission overlay rows
//! - `GrantStore`: collaborator grants
//! - `TeamReader`: team brokerage and membership
//!
//! The storage layer (rscrm-storage) implements `DataStore` with concrete
//! backends. The adapters here implement the domain traits on top of any
//! `DataStore`, including `dyn DataStore`.

use std::sync::Arc;

use async_trait::async_trait;

use rscrm_domain::error::{DomainError, DomainResult};
use rscrm_domain::{
    CollaboratorGrant, GrantStore, OwnershipReader, PermissionFlags, PermissionStore,
    ResourceOwnership, ResourceType, Role, RoleSet, TeamReader,
};
use rscrm_storage::{DataStore, StorageError, StoredGrant, StoredPermissions};

fn storage_failure(e: StorageError) -> DomainError {
    DomainError::StorageFailure {
        message: format!("storage error: {e}"),
    }
}

/// Implements `OwnershipReader` using a `DataStore`.
pub struct DataStoreOwnershipReader<S: DataStore + ?Sized> {
    storage: Arc<S>,
}

impl<S: DataStore + ?Sized> DataStoreOwnershipReader<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: DataStore + ?Sized> OwnershipReader for DataStoreOwnershipReader<S> {
    async fn get_resource_ownership(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DomainResult<Option<ResourceOwnership>> {
        match self
            .storage
            .get_resource(resource_type.table_name(), resource_id)
            .await
        {
            Ok(row) => Ok(Some(ResourceOwnership {
                id: row.id,
                owner_id: row.owner_id,
                team_id: row.team_id,
                is_private: row.is_private,
                lead_id: row.lead_id,
            })),
            Err(StorageError::ResourceNotFound { .. }) => Ok(None),
            Err(e) => Err(storage_failure(e)),
        }
    }

    async fn get_owner_broker_id(&self, user_id: &str) -> DomainResult<Option<String>> {
        self.storage
            .get_user_broker(user_id)
            .await
            .map_err(storage_failure)
    }
}

/// Implements `TeamReader` using a `DataStore`.
pub struct DataStoreTeamReader<S: DataStore + ?Sized> {
    storage: Arc<S>,
}

impl<S: DataStore + ?Sized> DataStoreTeamReader<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: DataStore + ?Sized> TeamReader for DataStoreTeamReader<S> {
    async fn get_team_broker_id(&self, team_id: &str) -> DomainResult<Option<String>> {
        self.storage
            .get_team_broker(team_id)
            .await
            .map_err(storage_failure)
    }

    /// A stored role outside the hierarchy is an error, so callers deny.
    async fn get_team_member_roles(
        &self,
        user_id: &str,
        team_id: &str,
    ) -> DomainResult<Option<RoleSet>> {
        let Some(member) = self
            .storage
            .get_team_member(user_id, team_id)
            .await
            .map_err(storage_failure)?
        else {
            return Ok(None);
        };
        let roles = match member.role.as_deref() {
            Some(name) => RoleSet::from(name.parse::<Role>()?),
            None => RoleSet::new(),
        };
        Ok(Some(roles))
    }
}

/// Implements `PermissionStore` using a `DataStore`.
pub struct DataStorePermissionStore<S: DataStore + ?Sized> {
    storage: Arc<S>,
}

impl<S: DataStore + ?Sized> DataStorePermissionStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: DataStore + ?Sized> PermissionStore for DataStorePermissionStore<S> {
    async fn get_permissions(
        &self,
        user_id: &str,
        team_id: &str,
    ) -> DomainResult<Option<PermissionFlags>> {
        let row = self
            .storage
            .get_permissions(user_id, team_id)
            .await
            .map_err(storage_failure)?;

        Ok(row.map(|row| PermissionFlags {
            can_delete: row.can_delete,
            can_edit_team_data: row.can_edit_team_data,
            can_view_financials: row.can_view_financials,
            can_manage_team: row.can_manage_team,
            is_broker_admin: row.is_broker_admin,
            is_team_admin: row.is_team_admin,
        }))
    }

    async fn upsert_permissions(
        &self,
        user_id: &str,
        team_id: &str,
        flags: &PermissionFlags,
        granted_by: &str,
    ) -> DomainResult<()> {
        self.storage
            .upsert_permissions(StoredPermissions {
                user_id: user_id.to_string(),
                team_id: team_id.to_string(),
                can_delete: flags.can_delete,
                can_edit_team_data: flags.can_edit_team_data,
                can_view_financials: flags.can_view_financials,
                can_manage_team: flags.can_manage_team,
                is_broker_admin: flags.is_broker_admin,
                is_team_admin: flags.is_team_admin,
                granted_by: Some(granted_by.to_string()),
                updated_at: chrono::Utc::now(),
            })
            .await
            .map_err(storage_failure)
    }

    async fn delete_permissions(&self, user_id: &str, team_id: &str) -> DomainResult<bool> {
        self.storage
            .delete_permissions(user_id, team_id)
            .await
            .map_err(storage_failure)
    }
}

/// Implements `GrantStore` using a `DataStore`.
pub struct DataStoreGrantStore<S: DataStore + ?Sized> {
    storage: Arc<S>,
}

impl<S: DataStore + ?Sized> DataStoreGrantStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

fn grant_from_row(row: StoredGrant) -> DomainResult<CollaboratorGrant> {
    // Rows written by other tools may name types the engine does not guard.
    let resource_type = row
        .resource_type
        .parse::<ResourceType>()
        .map_err(|e| DomainError::StorageFailure {
            message: format!("grant row has {e}"),
        })?;
    Ok(CollaboratorGrant {
        resource_type,
        resource_id: row.resource_id,
        user_id: row.user_id,
        can_view: row.can_view,
        can_edit: row.can_edit,
        can_delete: row.can_delete,
        granted_by: row.granted_by,
    })
}

#[async_trait]
impl<S: DataStore + ?Sized> GrantStore for DataStoreGrantStore<S> {
    async fn get_grant(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        user_id: &str,
    ) -> DomainResult<Option<CollaboratorGrant>> {
        self.storage
            .get_grant(resource_type.as_str(), resource_id, user_id)
            .await
            .map_err(storage_failure)?
            .map(grant_from_row)
            .transpose()
    }

    async fn upsert_grant(&self, grant: &CollaboratorGrant) -> DomainResult<()> {
        self.storage
            .upsert_grant(StoredGrant {
                resource_type: grant.resource_type.as_str().to_string(),
                resource_id: grant.resource_id.clone(),
                user_id: grant.user_id.clone(),
                can_view: grant.can_view,
                can_edit: grant.can_edit,
                can_delete: grant.can_delete,
                granted_by: grant.granted_by.clone(),
                created_at: chrono::Utc::now(),
            })
            .await
            .map_err(storage_failure)
    }

    async fn delete_grant(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        user_id: &str,
    ) -> DomainResult<bool> {
        self.storage
            .delete_grant(resource_type.as_str(), resource_id, user_id)
            .await
            .map_err(storage_failure)
    }

    async fn list_grants(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DomainResult<Vec<CollaboratorGrant>> {
        self.storage
            .list_grants(resource_type.as_str(), resource_id)
            .await
            .map_err(storage_failure)?
            .into_iter()
            .map(grant_from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rscrm_storage::{MemoryDataStore, StoredResource, StoredTeam, StoredUser};

    fn seeded_store() -> Arc<MemoryDataStore> {
        let store = MemoryDataStore::new_shared();
        store
            .put_resource(
                "leads",
                StoredResource {
                    id: "l1".to_string(),
                    owner_id: "u1".to_string(),
                    team_id: Some("t1".to_string()),
                    is_private: Some(true),
                    lead_id: None,
                },
            )
            .unwrap();
        store
            .put_user(StoredUser {
                id: "u1".to_string(),
                broker_id: Some("b1".to_string()),
                team_id: Some("t1".to_string()),
                role: Some("agent".to_string()),
            })
            .unwrap();
        store
            .put_team(StoredTeam {
                id: "t1".to_string(),
                primary_broker_id: Some("b1".to_string()),
            })
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_reader_maps_rows_and_missing_resources() {
        let reader = DataStoreOwnershipReader::new(seeded_store());

        let lead = reader
            .get_resource_ownership(ResourceType::Lead, "l1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lead.owner_id, "u1");
        assert_eq!(lead.is_private, Some(true));

        assert!(reader
            .get_resource_ownership(ResourceType::Lead, "missing")
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            reader.get_owner_broker_id("u1").await.unwrap().as_deref(),
            Some("b1")
        );
        assert_eq!(reader.get_owner_broker_id("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_team_reader_maps_membership_and_roles() {
        let storage = seeded_store();
        storage
            .put_user(StoredUser {
                id: "u9".to_string(),
                broker_id: None,
                team_id: Some("t1".to_string()),
                role: Some("overlord".to_string()),
            })
            .unwrap();
        let teams = DataStoreTeamReader::new(Arc::clone(&storage));

        assert_eq!(
            teams.get_team_broker_id("t1").await.unwrap().as_deref(),
            Some("b1")
        );
        assert_eq!(teams.get_team_broker_id("t2").await.unwrap(), None);

        let roles = teams.get_team_member_roles("u1", "t1").await.unwrap().unwrap();
        assert_eq!(roles.effective(), Some(Role::Agent));
        assert!(teams.get_team_member_roles("u1", "t2").await.unwrap().is_none());
        assert!(matches!(
            teams.get_team_member_roles("u9", "t1").await,
            Err(DomainError::InvalidRole { .. })
        ));
    }

    #[tokio::test]
    async fn test_permission_store_round_trips_flags_and_granter() {
        let storage = seeded_store();
        let store = DataStorePermissionStore::new(Arc::clone(&storage));
        let flags = PermissionFlags {
            can_manage_team: true,
            ..Default::default()
        };

        store
            .upsert_permissions("u2", "t1", &flags, "u1")
            .await
            .unwrap();

        assert_eq!(
            store.get_permissions("u2", "t1").await.unwrap(),
            Some(flags)
        );
        let row = storage.get_permissions("u2", "t1").await.unwrap().unwrap();
        assert_eq!(row.granted_by.as_deref(), Some("u1"));
        assert!(store.delete_permissions("u2", "t1").await.unwrap());
        assert_eq!(store.get_permissions("u2", "t1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_grant_store_uses_wire_type_names() {
        let storage = seeded_store();
        let store = DataStoreGrantStore::new(Arc::clone(&storage));
        let grant = CollaboratorGrant::new(ResourceType::Listing, "x1", "u2")
            .viewer()
            .granted_by("u1");

        store.upsert_grant(&grant).await.unwrap();

        let raw = storage.get_grant("listing", "x1", "u2").await.unwrap();
        assert!(raw.is_some());
        assert_eq!(
            store
                .get_grant(ResourceType::Listing, "x1", "u2")
                .await
                .unwrap(),
            Some(grant.clone())
        );
        assert_eq!(
            store.list_grants(ResourceType::Listing, "x1").await.unwrap(),
            vec![grant]
        );
    }

    #[tokio::test]
    async fn test_foreign_grant_type_surfaces_as_storage_failure() {
        let storage = seeded_store();
        storage
            .upsert_grant(StoredGrant {
                resource_type: "invoice".to_string(),
                resource_id: "i1".to_string(),
                user_id: "u2".to_string(),
                can_view: true,
                can_edit: false,
                can_delete: false,
                granted_by: None,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        // The domain asks by its own type names, so a foreign row is never
        // reached through get_grant; decoding it directly fails closed.
        let row = storage.get_grant("invoice", "i1", "u2").await.unwrap().unwrap();
        assert!(matches!(
            grant_from_row(row),
            Err(DomainError::StorageFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_adapters_work_over_trait_objects() {
        let storage: Arc<dyn DataStore> = seeded_store();
        let reader = DataStoreOwnershipReader::new(storage);
        assert!(reader
            .get_resource_ownership(ResourceType::Lead, "l1")
            .await
            .unwrap()
            .is_some());
    }
}
