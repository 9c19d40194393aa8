//! Shared fixtures for the guard tests.
//!
//! The fixture models one brokerage (`b1`) with one team (`t1`), plus an
//! outside agent in another brokerage:
//!
//! | User    | Role         | Team | Broker |
//! |---------|--------------|------|--------|
//! | admin   | system_admin | -    | -      |
//! | broker1 | broker       | t1   | b1     |
//! | owner1  | team_owner   | t1   | b1     |
//! | alice   | agent        | t1   | b1     |
//! | bob     | agent        | t1   | b1     |
//! | carol   | agent        | t2   | b2     |
//!
//! Teams: `t1` belongs to brokerage `b1`, `t2` to `b2`.
//!
//! | Resource            | Owner | Team | Notes               |
//! |---------------------|-------|------|---------------------|
//! | leads/lead-private  | alice | t1   | private             |
//! | leads/lead-open     | alice | t1   |                     |
//! | appointments/appt-1 | bob   | t1   | linked to lead-private |
//! | appointments/appt-2 | bob   | t1   | linked to lead-open |
//! | escrows/escrow-1    | alice | t1   |                     |
//! | listings/listing-9  | carol | t2   |                     |

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use rscrm_domain::{Identity, PermissionFlags, Role};
use rscrm_server::config::AuthorizationSettings;
use rscrm_server::AuthorizationService;
use rscrm_storage::{
    DataStore, HealthStatus, MemoryDataStore, StorageError, StorageResult, StoredGrant,
    StoredPermissions, StoredResource, StoredTeam, StoredUser,
};

pub fn resource(id: &str, owner: &str, team: Option<&str>) -> StoredResource {
    StoredResource {
        id: id.to_string(),
        owner_id: owner.to_string(),
        team_id: team.map(str::to_string),
        is_private: None,
        lead_id: None,
    }
}

fn user(id: &str, role: &str, team: Option<&str>, broker: Option<&str>) -> StoredUser {
    StoredUser {
        id: id.to_string(),
        broker_id: broker.map(str::to_string),
        team_id: team.map(str::to_string),
        role: Some(role.to_string()),
    }
}

/// Seeds the fixture into a fresh in-memory store.
pub fn seeded_store() -> Arc<MemoryDataStore> {
    let store = MemoryDataStore::new_shared();

    for (id, role, team, broker) in [
        ("admin", "system_admin", None, None),
        ("broker1", "broker", Some("t1"), Some("b1")),
        ("owner1", "team_owner", Some("t1"), Some("b1")),
        ("alice", "agent", Some("t1"), Some("b1")),
        ("bob", "agent", Some("t1"), Some("b1")),
        ("carol", "agent", Some("t2"), Some("b2")),
    ] {
        store.put_user(user(id, role, team, broker)).unwrap();
    }
    for (id, broker) in [("t1", "b1"), ("t2", "b2")] {
        store
            .put_team(StoredTeam {
                id: id.to_string(),
                primary_broker_id: Some(broker.to_string()),
            })
            .unwrap();
    }

    let mut private_lead = resource("lead-private", "alice", Some("t1"));
    private_lead.is_private = Some(true);
    store.put_resource("leads", private_lead).unwrap();

    let mut open_lead = resource("lead-open", "alice", Some("t1"));
    open_lead.is_private = Some(false);
    store.put_resource("leads", open_lead).unwrap();

    let mut appt_private = resource("appt-1", "bob", Some("t1"));
    appt_private.lead_id = Some("lead-private".to_string());
    store.put_resource("appointments", appt_private).unwrap();

    let mut appt_open = resource("appt-2", "bob", Some("t1"));
    appt_open.lead_id = Some("lead-open".to_string());
    store.put_resource("appointments", appt_open).unwrap();

    store
        .put_resource("escrows", resource("escrow-1", "alice", Some("t1")))
        .unwrap();
    store
        .put_resource("listings", resource("listing-9", "carol", Some("t2")))
        .unwrap();

    store
}

pub fn service_over(store: Arc<dyn DataStore>) -> AuthorizationService {
    AuthorizationService::new(store, AuthorizationSettings::default())
}

/// Builds the service over the seeded store and hands back the store for
/// further seeding.
pub fn create_test_service() -> (Arc<MemoryDataStore>, AuthorizationService) {
    let store = seeded_store();
    let service = service_over(Arc::clone(&store) as Arc<dyn DataStore>);
    (store, service)
}

pub fn admin() -> Identity {
    Identity::new("admin", Role::SystemAdmin).unwrap()
}

pub fn broker() -> Identity {
    Identity::new("broker1", Role::Broker)
        .unwrap()
        .with_broker("b1")
        .with_team("t1")
}

pub fn team_owner() -> Identity {
    Identity::new("owner1", Role::TeamOwner)
        .unwrap()
        .with_broker("b1")
        .with_team("t1")
}

pub fn alice() -> Identity {
    Identity::new("alice", Role::Agent)
        .unwrap()
        .with_broker("b1")
        .with_team("t1")
}

pub fn bob() -> Identity {
    Identity::new("bob", Role::Agent)
        .unwrap()
        .with_broker("b1")
        .with_team("t1")
}

pub fn carol() -> Identity {
    Identity::new("carol", Role::Agent)
        .unwrap()
        .with_broker("b2")
        .with_team("t2")
}

/// Writes an overlay row directly, bypassing the entitlement check.
pub async fn set_overlay(store: &MemoryDataStore, user_id: &str, team_id: &str, flags: PermissionFlags) {
    store
        .upsert_permissions(StoredPermissions {
            user_id: user_id.to_string(),
            team_id: team_id.to_string(),
            can_delete: flags.can_delete,
            can_edit_team_data: flags.can_edit_team_data,
            can_view_financials: flags.can_view_financials,
            can_manage_team: flags.can_manage_team,
            is_broker_admin: flags.is_broker_admin,
            is_team_admin: flags.is_team_admin,
            granted_by: Some("fixture".to_string()),
            updated_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
}

/// A store whose every call fails, as during a database outage.
pub struct UnavailableStore;

fn outage() -> StorageError {
    StorageError::ConnectionError {
        message: "connection refused".to_string(),
    }
}

#[async_trait]
impl DataStore for UnavailableStore {
    async fn get_resource(&self, _table: &str, _id: &str) -> StorageResult<StoredResource> {
        Err(outage())
    }

    async fn get_user_broker(&self, _user_id: &str) -> StorageResult<Option<String>> {
        Err(outage())
    }

    async fn get_team_broker(&self, _team_id: &str) -> StorageResult<Option<String>> {
        Err(outage())
    }

    async fn get_team_member(
        &self,
        _user_id: &str,
        _team_id: &str,
    ) -> StorageResult<Option<StoredUser>> {
        Err(outage())
    }

    async fn get_permissions(
        &self,
        _user_id: &str,
        _team_id: &str,
    ) -> StorageResult<Option<StoredPermissions>> {
        Err(outage())
    }

    async fn upsert_permissions(&self, _permissions: StoredPermissions) -> StorageResult<()> {
        Err(outage())
    }

    async fn delete_permissions(&self, _user_id: &str, _team_id: &str) -> StorageResult<bool> {
        Err(outage())
    }

    async fn get_grant(
        &self,
        _resource_type: &str,
        _resource_id: &str,
        _user_id: &str,
    ) -> StorageResult<Option<StoredGrant>> {
        Err(outage())
    }

    async fn upsert_grant(&self, _grant: StoredGrant) -> StorageResult<()> {
        Err(outage())
    }

    async fn delete_grant(
        &self,
        _resource_type: &str,
        _resource_id: &str,
        _user_id: &str,
    ) -> StorageResult<bool> {
        Err(outage())
    }

    async fn list_grants(
        &self,
        _resource_type: &str,
        _resource_id: &str,
    ) -> StorageResult<Vec<StoredGrant>> {
        Err(outage())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Err(StorageError::HealthCheckFailed {
            message: "connection refused".to_string(),
        })
    }
}
