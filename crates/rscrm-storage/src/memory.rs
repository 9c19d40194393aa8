//! In-memory storage implementation for testing.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use crate::error::{HealthStatus, StorageError, StorageResult};
use crate::traits::{
    table_has_lead_link, table_has_privacy_flag, validate_grant, validate_id, validate_permissions,
    validate_resource_table, DataStore, StoredGrant, StoredPermissions, StoredResource, StoredTeam,
    StoredUser,
};

type GrantKey = (String, String, String);

/// In-memory implementation of DataStore.
///
/// Resource rows, users and teams are seeded with
/// [`MemoryDataStore::put_resource`], [`MemoryDataStore::put_user`] and
/// [`MemoryDataStore::put_team`]; the engine itself only reads them.
/// Upserts are atomic per key, so concurrent writers on the same key
/// resolve last-writer-wins without duplicate rows.
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    /// Resource rows keyed by `(table, id)`.
    resources: DashMap<(String, String), StoredResource>,
    users: DashMap<String, StoredUser>,
    teams: DashMap<String, StoredTeam>,
    /// Overlay rows keyed by `(user_id, team_id)`.
    permissions: DashMap<(String, String), StoredPermissions>,
    grants: DashMap<GrantKey, StoredGrant>,
}

impl MemoryDataStore {
    /// Creates a new in-memory data store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory data store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Inserts or replaces a resource row.
    ///
    /// Columns the table does not have are dropped, matching what the
    /// PostgreSQL backend would read back.
    pub fn put_resource(&self, table: &str, mut resource: StoredResource) -> StorageResult<()> {
        validate_resource_table(table)?;
        validate_id("id", &resource.id)?;
        validate_id("owner_id", &resource.owner_id)?;
        if !table_has_privacy_flag(table) {
            resource.is_private = None;
        }
        if !table_has_lead_link(table) {
            resource.lead_id = None;
        }
        self.resources
            .insert((table.to_string(), resource.id.clone()), resource);
        Ok(())
    }

    /// Inserts or replaces a user.
    pub fn put_user(&self, user: StoredUser) -> StorageResult<()> {
        validate_id("id", &user.id)?;
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    /// Inserts or replaces a team.
    pub fn put_team(&self, team: StoredTeam) -> StorageResult<()> {
        validate_id("id", &team.id)?;
        self.teams.insert(team.id.clone(), team);
        Ok(())
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn get_resource(&self, table: &str, id: &str) -> StorageResult<StoredResource> {
        validate_resource_table(table)?;
        self.resources
            .get(&(table.to_string(), id.to_string()))
            .map(|r| r.value().clone())
            .ok_or_else(|| StorageError::ResourceNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })
    }

    async fn get_user_broker(&self, user_id: &str) -> StorageResult<Option<String>> {
        Ok(self
            .users
            .get(user_id)
            .and_then(|u| u.value().broker_id.clone()))
    }

    async fn get_team_broker(&self, team_id: &str) -> StorageResult<Option<String>> {
        Ok(self
            .teams
            .get(team_id)
            .and_then(|t| t.value().primary_broker_id.clone()))
    }

    async fn get_team_member(
        &self,
        user_id: &str,
        team_id: &str,
    ) -> StorageResult<Option<StoredUser>> {
        Ok(self
            .users
            .get(user_id)
            .filter(|u| u.value().team_id.as_deref() == Some(team_id))
            .map(|u| u.value().clone()))
    }

    async fn get_permissions(
        &self,
        user_id: &str,
        team_id: &str,
    ) -> StorageResult<Option<StoredPermissions>> {
        Ok(self
            .permissions
            .get(&(user_id.to_string(), team_id.to_string()))
            .map(|p| p.value().clone()))
    }

    #[instrument(skip(self, permissions), fields(user_id = %permissions.user_id, team_id = %permissions.team_id))]
    async fn upsert_permissions(&self, permissions: StoredPermissions) -> StorageResult<()> {
        validate_permissions(&permissions)?;

        let key = (permissions.user_id.clone(), permissions.team_id.clone());
        self.permissions.insert(key, permissions);
        Ok(())
    }

    async fn delete_permissions(&self, user_id: &str, team_id: &str) -> StorageResult<bool> {
        Ok(self
            .permissions
            .remove(&(user_id.to_string(), team_id.to_string()))
            .is_some())
    }

    async fn get_grant(
        &self,
        resource_type: &str,
        resource_id: &str,
        user_id: &str,
    ) -> StorageResult<Option<StoredGrant>> {
        let key = (
            resource_type.to_string(),
            resource_id.to_string(),
            user_id.to_string(),
        );
        Ok(self.grants.get(&key).map(|g| g.value().clone()))
    }

    #[instrument(skip(self, grant), fields(resource_type = %grant.resource_type, resource_id = %grant.resource_id))]
    async fn upsert_grant(&self, grant: StoredGrant) -> StorageResult<()> {
        validate_grant(&grant)?;

        use dashmap::mapref::entry::Entry;
        let key = (
            grant.resource_type.clone(),
            grant.resource_id.clone(),
            grant.user_id.clone(),
        );
        match self.grants.entry(key) {
            Entry::Occupied(mut entry) => {
                // The original grant time survives a replacement.
                let created_at = entry.get().created_at;
                entry.insert(StoredGrant { created_at, ..grant });
            }
            Entry::Vacant(entry) => {
                entry.insert(grant);
            }
        }
        Ok(())
    }

    async fn delete_grant(
        &self,
        resource_type: &str,
        resource_id: &str,
        user_id: &str,
    ) -> StorageResult<bool> {
        let key = (
            resource_type.to_string(),
            resource_id.to_string(),
            user_id.to_string(),
        );
        Ok(self.grants.remove(&key).is_some())
    }

    async fn list_grants(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> StorageResult<Vec<StoredGrant>> {
        let mut grants: Vec<StoredGrant> = self
            .grants
            .iter()
            .filter(|g| g.resource_type == resource_type && g.resource_id == resource_id)
            .map(|g| g.value().clone())
            .collect();
        grants.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(grants)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            latency: std::time::Duration::ZERO,
            pool_stats: None,
            message: Some("in-memory storage".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(id: &str, owner: &str) -> StoredResource {
        StoredResource {
            id: id.to_string(),
            owner_id: owner.to_string(),
            team_id: Some("t1".to_string()),
            is_private: Some(true),
            lead_id: Some("ignored".to_string()),
        }
    }

    fn flags(user_id: &str, team_id: &str, granted_by: &str) -> StoredPermissions {
        StoredPermissions {
            user_id: user_id.to_string(),
            team_id: team_id.to_string(),
            can_delete: false,
            can_edit_team_data: true,
            can_view_financials: false,
            can_manage_team: false,
            is_broker_admin: false,
            is_team_admin: false,
            granted_by: Some(granted_by.to_string()),
            updated_at: chrono::Utc::now(),
        }
    }

    fn grant(resource_id: &str, user_id: &str) -> StoredGrant {
        StoredGrant {
            resource_type: "escrow".to_string(),
            resource_id: resource_id.to_string(),
            user_id: user_id.to_string(),
            can_view: true,
            can_edit: false,
            can_delete: false,
            granted_by: None,
            created_at: chrono::Utc::now(),
        }
    }

    // Test: InMemoryStore can be created as shared Arc
    #[tokio::test]
    async fn test_memory_store_shared() {
        let store = MemoryDataStore::new_shared();
        store.put_resource("leads", lead("l1", "u1")).unwrap();

        let store2 = Arc::clone(&store);
        let retrieved = store2.get_resource("leads", "l1").await.unwrap();
        assert_eq!(retrieved.owner_id, "u1");
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_found() {
        let store = MemoryDataStore::new();
        let result = store.get_resource("escrows", "nope").await;
        assert!(matches!(result, Err(StorageError::ResourceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_unknown_table_is_rejected() {
        let store = MemoryDataStore::new();
        let result = store.get_resource("users", "u1").await;
        assert!(matches!(result, Err(StorageError::InvalidInput { .. })));
        assert!(store.put_resource("users", lead("u1", "u1")).is_err());
    }

    #[tokio::test]
    async fn test_columns_a_table_lacks_are_dropped() {
        let store = MemoryDataStore::new();
        store.put_resource("leads", lead("l1", "u1")).unwrap();
        store.put_resource("escrows", lead("e1", "u1")).unwrap();

        let stored_lead = store.get_resource("leads", "l1").await.unwrap();
        assert_eq!(stored_lead.is_private, Some(true));
        assert_eq!(stored_lead.lead_id, None);

        let escrow = store.get_resource("escrows", "e1").await.unwrap();
        assert_eq!(escrow.is_private, None);
    }

    #[tokio::test]
    async fn test_user_broker_lookup() {
        let store = MemoryDataStore::new();
        store
            .put_user(StoredUser {
                id: "u1".to_string(),
                broker_id: Some("b1".to_string()),
                team_id: None,
                role: Some("agent".to_string()),
            })
            .unwrap();

        assert_eq!(
            store.get_user_broker("u1").await.unwrap(),
            Some("b1".to_string())
        );
        assert_eq!(store.get_user_broker("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_team_lookups() {
        let store = MemoryDataStore::new();
        store
            .put_team(StoredTeam {
                id: "t1".to_string(),
                primary_broker_id: Some("b1".to_string()),
            })
            .unwrap();
        store
            .put_user(StoredUser {
                id: "u1".to_string(),
                broker_id: Some("b1".to_string()),
                team_id: Some("t1".to_string()),
                role: Some("team_owner".to_string()),
            })
            .unwrap();

        assert_eq!(
            store.get_team_broker("t1").await.unwrap().as_deref(),
            Some("b1")
        );
        assert_eq!(store.get_team_broker("t9").await.unwrap(), None);

        let member = store.get_team_member("u1", "t1").await.unwrap().unwrap();
        assert_eq!(member.role.as_deref(), Some("team_owner"));
        assert!(store.get_team_member("u1", "t2").await.unwrap().is_none());
        assert!(store.get_team_member("ghost", "t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_permission_upsert_replaces_by_key() {
        let store = MemoryDataStore::new();
        store.upsert_permissions(flags("u1", "t1", "a")).await.unwrap();
        store.upsert_permissions(flags("u1", "t1", "b")).await.unwrap();
        store.upsert_permissions(flags("u1", "t2", "c")).await.unwrap();

        let row = store.get_permissions("u1", "t1").await.unwrap().unwrap();
        assert_eq!(row.granted_by.as_deref(), Some("b"));
        assert!(store.get_permissions("u1", "t3").await.unwrap().is_none());

        assert!(store.delete_permissions("u1", "t1").await.unwrap());
        assert!(!store.delete_permissions("u1", "t1").await.unwrap());
    }

    #[tokio::test]
    async fn test_permission_upsert_validates_keys() {
        let store = MemoryDataStore::new();
        let result = store.upsert_permissions(flags("", "t1", "a")).await;
        assert!(matches!(result, Err(StorageError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_grant_replacement_keeps_creation_time() {
        let store = MemoryDataStore::new();
        let first = grant("e1", "u2");
        let created_at = first.created_at;
        store.upsert_grant(first).await.unwrap();

        let mut second = grant("e1", "u2");
        second.can_edit = true;
        second.created_at = created_at + chrono::Duration::seconds(60);
        store.upsert_grant(second).await.unwrap();

        let stored = store.get_grant("escrow", "e1", "u2").await.unwrap().unwrap();
        assert!(stored.can_edit);
        assert_eq!(stored.created_at, created_at);
    }

    #[tokio::test]
    async fn test_list_grants_is_scoped_and_ordered() {
        let store = MemoryDataStore::new();
        store.upsert_grant(grant("e1", "u3")).await.unwrap();
        store.upsert_grant(grant("e1", "u2")).await.unwrap();
        store.upsert_grant(grant("e2", "u1")).await.unwrap();

        let grants = store.list_grants("escrow", "e1").await.unwrap();
        let users: Vec<&str> = grants.iter().map(|g| g.user_id.as_str()).collect();
        assert_eq!(users, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_keep_one_row_per_key() {
        let store = MemoryDataStore::new_shared();
        let mut handles = Vec::new();
        for i in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .upsert_permissions(flags("u1", "t1", &format!("granter-{i}")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.permissions.len(), 1);
        let row = store.get_permissions("u1", "t1").await.unwrap().unwrap();
        assert!(row.granted_by.unwrap().starts_with("granter-"));
    }

    #[tokio::test]
    async fn test_in_memory_health_check_always_returns_healthy() {
        let store = MemoryDataStore::new();

        let status = store.health_check().await.unwrap();

        assert!(status.healthy, "In-memory store should always be healthy");
        assert!(status.pool_stats.is_none(), "In-memory store has no pool");
        assert_eq!(status.message, Some("in-memory storage".to_string()));
    }
}
