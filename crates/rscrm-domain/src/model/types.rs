//! Core type definitions for identities, resources and permissions.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A role in the four-level hierarchy.
///
/// Variants are declared from least to most privileged so that the derived
/// `Ord` can pick the effective role out of a [`RoleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Agent,
    TeamOwner,
    Broker,
    SystemAdmin,
}

impl Role {
    /// Every role, least privileged first.
    pub const ALL: [Role; 4] = [Role::Agent, Role::TeamOwner, Role::Broker, Role::SystemAdmin];

    /// Returns the wire name of the role (e.g., "team_owner").
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::TeamOwner => "team_owner",
            Role::Broker => "broker",
            Role::SystemAdmin => "system_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "agent" => Ok(Role::Agent),
            "team_owner" => Ok(Role::TeamOwner),
            "broker" => Ok(Role::Broker),
            "system_admin" => Ok(Role::SystemAdmin),
            other => Err(DomainError::InvalidRole {
                value: other.to_string(),
            }),
        }
    }
}

/// The set of roles carried by an identity.
///
/// Authentication may hand over a single role or several; every check works
/// on the highest-privilege member returned by [`RoleSet::effective`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    /// Creates an empty role set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a role set from role names, dropping names outside the hierarchy.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| name.as_ref().parse::<Role>().ok())
            .collect()
    }

    /// Adds a role to the set.
    pub fn insert(&mut self, role: Role) {
        self.0.insert(role);
    }

    /// Returns true if the set contains the role.
    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// Returns true if no role is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest-privilege role in the set, if any.
    pub fn effective(&self) -> Option<Role> {
        self.0.iter().next_back().copied()
    }

    /// Iterates roles from least to most privileged.
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }
}

impl From<Role> for RoleSet {
    fn from(role: Role) -> Self {
        let mut set = RoleSet::new();
        set.insert(role);
        set
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A verified identity, constructed per request by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user_id: String,
    roles: RoleSet,
    broker_id: Option<String>,
    team_id: Option<String>,
}

impl Identity {
    /// Creates an identity. The user ID must be non-empty.
    pub fn new(user_id: impl Into<String>, roles: impl Into<RoleSet>) -> Result<Self, DomainError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(DomainError::InvalidIdentity {
                message: "user id cannot be empty".to_string(),
            });
        }
        Ok(Self {
            user_id,
            roles: roles.into(),
            broker_id: None,
            team_id: None,
        })
    }

    /// Sets the brokerage the identity belongs to. Empty IDs are treated as absent.
    pub fn with_broker(mut self, broker_id: impl Into<String>) -> Self {
        self.broker_id = non_empty(broker_id.into());
        self
    }

    /// Sets the team the identity belongs to. Empty IDs are treated as absent.
    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = non_empty(team_id.into());
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    /// The effective (highest-privilege) role.
    pub fn role(&self) -> Option<Role> {
        self.roles.effective()
    }

    pub fn broker_id(&self) -> Option<&str> {
        self.broker_id.as_deref()
    }

    pub fn team_id(&self) -> Option<&str> {
        self.team_id.as_deref()
    }

    pub fn is_system_admin(&self) -> bool {
        self.role() == Some(Role::SystemAdmin)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// The CRM resource types guarded by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Escrow,
    Client,
    Listing,
    Lead,
    Appointment,
}

/// Static per-type metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceMeta {
    /// Wire name (e.g., "escrow").
    pub name: &'static str,
    /// Backing table (e.g., "escrows").
    pub table: &'static str,
    /// Whether rows carry their own `is_private` flag.
    pub has_privacy_flag: bool,
    /// Type whose privacy is inherited through the row's link column.
    pub parent_link: Option<ResourceType>,
}

const ESCROW_META: ResourceMeta = ResourceMeta {
    name: "escrow",
    table: "escrows",
    has_privacy_flag: false,
    parent_link: None,
};

const CLIENT_META: ResourceMeta = ResourceMeta {
    name: "client",
    table: "clients",
    has_privacy_flag: false,
    parent_link: None,
};

const LISTING_META: ResourceMeta = ResourceMeta {
    name: "listing",
    table: "listings",
    has_privacy_flag: false,
    parent_link: None,
};

const LEAD_META: ResourceMeta = ResourceMeta {
    name: "lead",
    table: "leads",
    has_privacy_flag: true,
    parent_link: None,
};

const APPOINTMENT_META: ResourceMeta = ResourceMeta {
    name: "appointment",
    table: "appointments",
    has_privacy_flag: false,
    parent_link: Some(ResourceType::Lead),
};

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Escrow,
        ResourceType::Client,
        ResourceType::Listing,
        ResourceType::Lead,
        ResourceType::Appointment,
    ];

    /// Returns the static metadata for this type.
    pub fn meta(self) -> &'static ResourceMeta {
        match self {
            ResourceType::Escrow => &ESCROW_META,
            ResourceType::Client => &CLIENT_META,
            ResourceType::Listing => &LISTING_META,
            ResourceType::Lead => &LEAD_META,
            ResourceType::Appointment => &APPOINTMENT_META,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.meta().name
    }

    pub fn table_name(self) -> &'static str {
        self.meta().table
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == value)
            .ok_or_else(|| DomainError::UnknownResourceType {
                value: value.to_string(),
            })
    }
}

/// Ownership and privacy columns of a single resource row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOwnership {
    pub id: String,
    pub owner_id: String,
    pub team_id: Option<String>,
    /// Only populated for types with a privacy flag.
    pub is_private: Option<bool>,
    /// Only populated for types with a parent link.
    pub lead_id: Option<String>,
}

impl ResourceOwnership {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            team_id: None,
            is_private: None,
            lead_id: None,
        }
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = Some(is_private);
        self
    }

    pub fn with_lead(mut self, lead_id: impl Into<String>) -> Self {
        self.lead_id = Some(lead_id.into());
        self
    }
}

/// The operation being authorized on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    View,
    Modify,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::View => "view",
            Operation::Modify => "modify",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested breadth of a list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    User,
    Team,
    Brokerage,
    All,
}

impl Scope {
    /// Normalizes a requested scope token, accepting `my` as an alias for `user`.
    pub fn from_token(token: &str) -> Option<Scope> {
        match token {
            "my" | "user" => Some(Scope::User),
            "team" => Some(Scope::Team),
            "brokerage" => Some(Scope::Brokerage),
            "all" => Some(Scope::All),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::Team => "team",
            Scope::Brokerage => "brokerage",
            Scope::All => "all",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-(user, team) capability flags layered on top of the base role.
///
/// The default value is all-false, which is also what an absent overlay means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionFlags {
    pub can_delete: bool,
    pub can_edit_team_data: bool,
    pub can_view_financials: bool,
    pub can_manage_team: bool,
    pub is_broker_admin: bool,
    pub is_team_admin: bool,
}

impl PermissionFlags {
    /// Reads a single flag by name.
    pub fn get(&self, name: PermissionName) -> bool {
        match name {
            PermissionName::CanDelete => self.can_delete,
            PermissionName::CanEditTeamData => self.can_edit_team_data,
            PermissionName::CanViewFinancials => self.can_view_financials,
            PermissionName::CanManageTeam => self.can_manage_team,
            PermissionName::IsBrokerAdmin => self.is_broker_admin,
            PermissionName::IsTeamAdmin => self.is_team_admin,
        }
    }

    /// Returns a copy with one flag set.
    pub fn with(mut self, name: PermissionName, value: bool) -> Self {
        let slot = match name {
            PermissionName::CanDelete => &mut self.can_delete,
            PermissionName::CanEditTeamData => &mut self.can_edit_team_data,
            PermissionName::CanViewFinancials => &mut self.can_view_financials,
            PermissionName::CanManageTeam => &mut self.can_manage_team,
            PermissionName::IsBrokerAdmin => &mut self.is_broker_admin,
            PermissionName::IsTeamAdmin => &mut self.is_team_admin,
        };
        *slot = value;
        self
    }
}

/// Names of the overlay flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionName {
    CanDelete,
    CanEditTeamData,
    CanViewFinancials,
    CanManageTeam,
    IsBrokerAdmin,
    IsTeamAdmin,
}

impl PermissionName {
    pub const ALL: [PermissionName; 6] = [
        PermissionName::CanDelete,
        PermissionName::CanEditTeamData,
        PermissionName::CanViewFinancials,
        PermissionName::CanManageTeam,
        PermissionName::IsBrokerAdmin,
        PermissionName::IsTeamAdmin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionName::CanDelete => "can_delete",
            PermissionName::CanEditTeamData => "can_edit_team_data",
            PermissionName::CanViewFinancials => "can_view_financials",
            PermissionName::CanManageTeam => "can_manage_team",
            PermissionName::IsBrokerAdmin => "is_broker_admin",
            PermissionName::IsTeamAdmin => "is_team_admin",
        }
    }
}

impl fmt::Display for PermissionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionName {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        PermissionName::ALL
            .into_iter()
            .find(|p| p.as_str() == value)
            .ok_or_else(|| DomainError::UnknownPermission {
                value: value.to_string(),
            })
    }
}

/// An explicit per-resource access entry for a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorGrant {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub user_id: String,
    pub can_view: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub granted_by: Option<String>,
}

impl CollaboratorGrant {
    /// Creates a grant with no capabilities set.
    pub fn new(
        resource_type: ResourceType,
        resource_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_type,
            resource_id: resource_id.into(),
            user_id: user_id.into(),
            can_view: false,
            can_edit: false,
            can_delete: false,
            granted_by: None,
        }
    }

    pub fn viewer(mut self) -> Self {
        self.can_view = true;
        self
    }

    pub fn editor(mut self) -> Self {
        self.can_edit = true;
        self
    }

    pub fn deleter(mut self) -> Self {
        self.can_delete = true;
        self
    }

    pub fn granted_by(mut self, user_id: impl Into<String>) -> Self {
        self.granted_by = Some(user_id.into());
        self
    }

    /// Whether this grant covers the operation.
    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::View => self.can_view,
            Operation::Modify => self.can_edit,
            Operation::Delete => self.can_delete,
        }
    }
}
