//! Ownership filters for list queries.
//!
//! [`build_ownership_filter`] turns a validated scope into a storage-agnostic
//! [`Predicate`]. The predicate can be evaluated against an in-memory row
//! ([`Predicate::evaluate`]) or rendered into a PostgreSQL `WHERE` fragment
//! ([`render_postgres`]).
//!
//! Privacy is folded into every non-admin team and brokerage filter, so a
//! list query never returns a row that the ownership oracle would hide.

mod sql;
#[cfg(test)]
mod filter_proptest;

pub use sql::{render_postgres, SqlFilter, SqlOptions};

use tracing::debug;

use crate::error::{DomainError, DomainResult};
use crate::model::{Identity, ResourceType, Role, Scope};
use crate::scope::EffectiveScope;

/// Text-valued columns a predicate can compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    OwnerId,
    TeamId,
    /// Brokerage of the row's owner.
    OwnerBrokerId,
    /// Owner of the lead the row links to.
    LinkedLeadOwnerId,
}

/// Boolean columns a predicate can compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagField {
    IsPrivate,
    /// Privacy of the lead the row links to. False when there is no link.
    LinkedLeadIsPrivate,
}

/// A filter over resource rows.
///
/// Build compound predicates with [`Predicate::and`] and [`Predicate::or`],
/// which fold away constant branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    True,
    False,
    TextEq(TextField, String),
    FlagEq(FlagField, bool),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn text_eq(field: TextField, value: impl Into<String>) -> Self {
        Predicate::TextEq(field, value.into())
    }

    pub fn flag_eq(field: FlagField, value: bool) -> Self {
        Predicate::FlagEq(field, value)
    }

    /// Conjunction of `parts`, simplified.
    pub fn and(parts: impl IntoIterator<Item = Predicate>) -> Self {
        let mut kept = Vec::new();
        for part in parts {
            match part {
                Predicate::True => {}
                Predicate::False => return Predicate::False,
                Predicate::And(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Predicate::True,
            1 => kept.remove(0),
            _ => Predicate::And(kept),
        }
    }

    /// Disjunction of `parts`, simplified.
    pub fn or(parts: impl IntoIterator<Item = Predicate>) -> Self {
        let mut kept = Vec::new();
        for part in parts {
            match part {
                Predicate::False => {}
                Predicate::True => return Predicate::True,
                Predicate::Or(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Predicate::False,
            1 => kept.remove(0),
            _ => Predicate::Or(kept),
        }
    }

    /// True when the predicate admits every row.
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Predicate::True)
    }

    /// Evaluates the predicate against a single row.
    ///
    /// An absent column never equals anything, mirroring SQL `NULL`.
    pub fn evaluate(&self, row: &impl RowView) -> bool {
        match self {
            Predicate::True => true,
            Predicate::False => false,
            Predicate::TextEq(field, value) => row.text(*field) == Some(value.as_str()),
            Predicate::FlagEq(field, value) => row.flag(*field) == Some(*value),
            Predicate::And(parts) => parts.iter().all(|p| p.evaluate(row)),
            Predicate::Or(parts) => parts.iter().any(|p| p.evaluate(row)),
        }
    }
}

/// Read access to the columns a predicate compares.
pub trait RowView {
    fn text(&self, field: TextField) -> Option<&str>;
    fn flag(&self, field: FlagField) -> Option<bool>;
}

/// A denormalised resource row, as a query layer would join it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRow {
    pub owner_id: String,
    pub team_id: Option<String>,
    pub is_private: bool,
    pub owner_broker_id: Option<String>,
    pub linked_lead_is_private: bool,
    pub linked_lead_owner_id: Option<String>,
}

impl ResourceRow {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    pub fn with_owner_broker(mut self, broker_id: impl Into<String>) -> Self {
        self.owner_broker_id = Some(broker_id.into());
        self
    }

    /// Links the row to a lead owned by `owner_id`.
    pub fn linked_to_lead(mut self, owner_id: impl Into<String>, is_private: bool) -> Self {
        self.linked_lead_owner_id = Some(owner_id.into());
        self.linked_lead_is_private = is_private;
        self
    }
}

impl RowView for ResourceRow {
    fn text(&self, field: TextField) -> Option<&str> {
        match field {
            TextField::OwnerId => Some(self.owner_id.as_str()),
            TextField::TeamId => self.team_id.as_deref(),
            TextField::OwnerBrokerId => self.owner_broker_id.as_deref(),
            TextField::LinkedLeadOwnerId => self.linked_lead_owner_id.as_deref(),
        }
    }

    fn flag(&self, field: FlagField) -> Option<bool> {
        match field {
            FlagField::IsPrivate => Some(self.is_private),
            FlagField::LinkedLeadIsPrivate => Some(self.linked_lead_is_private),
        }
    }
}

/// Builds the ownership filter for a list query.
///
/// The scope has already been validated by the scope resolver; the checks
/// here re-validate it against the identity and refuse rather than widen.
pub fn build_ownership_filter(
    identity: &Identity,
    resource_type: ResourceType,
    scope: &EffectiveScope,
) -> DomainResult<Predicate> {
    let Some(role) = identity.role() else {
        return Err(violation(scope.scope(), "invalid user role"));
    };
    if scope.user_id() != identity.user_id() {
        return Err(violation(scope.scope(), "scope was resolved for a different user"));
    }
    let owner = Predicate::text_eq(TextField::OwnerId, identity.user_id());

    let predicate = match (role, scope.scope()) {
        (_, Scope::User) => owner,
        (Role::SystemAdmin, _) => Predicate::True,
        (_, Scope::All) => {
            return Err(violation(
                Scope::All,
                "only system_admin can access 'all' scope",
            ));
        }
        (role, Scope::Team) => match identity.team_id() {
            Some(team_id) => Predicate::and([
                Predicate::text_eq(TextField::TeamId, team_id),
                team_privacy_guard(resource_type, identity.user_id()),
            ]),
            // A broker outside any team sees no team rows.
            None if role == Role::Broker => Predicate::False,
            None => return Err(violation(Scope::Team, "user is not associated with a team")),
        },
        (role, Scope::Brokerage) => {
            if role != Role::Broker && !scope.is_overlay_elevated() {
                return Err(violation(
                    Scope::Brokerage,
                    "only brokers can access brokerage scope",
                ));
            }
            let Some(broker_id) = identity.broker_id() else {
                return Err(violation(
                    Scope::Brokerage,
                    "user is not associated with a broker",
                ));
            };
            Predicate::and([
                Predicate::text_eq(TextField::OwnerBrokerId, broker_id),
                brokerage_privacy_guard(resource_type),
            ])
        }
    };

    debug!(
        user_id = %identity.user_id(),
        resource_type = %resource_type,
        scope = %scope.scope(),
        unrestricted = predicate.is_unrestricted(),
        "ownership filter built"
    );
    Ok(predicate)
}

/// Team members still see their own private rows.
fn team_privacy_guard(resource_type: ResourceType, user_id: &str) -> Predicate {
    let meta = resource_type.meta();
    let own_privacy = if meta.has_privacy_flag {
        Predicate::or([
            Predicate::flag_eq(FlagField::IsPrivate, false),
            Predicate::text_eq(TextField::OwnerId, user_id),
        ])
    } else {
        Predicate::True
    };
    let inherited = if meta.parent_link.is_some() {
        Predicate::or([
            Predicate::flag_eq(FlagField::LinkedLeadIsPrivate, false),
            Predicate::text_eq(TextField::LinkedLeadOwnerId, user_id),
        ])
    } else {
        Predicate::True
    };
    Predicate::and([own_privacy, inherited])
}

/// Brokerage reach has no owner exception.
fn brokerage_privacy_guard(resource_type: ResourceType) -> Predicate {
    let meta = resource_type.meta();
    let own_privacy = if meta.has_privacy_flag {
        Predicate::flag_eq(FlagField::IsPrivate, false)
    } else {
        Predicate::True
    };
    let inherited = if meta.parent_link.is_some() {
        Predicate::flag_eq(FlagField::LinkedLeadIsPrivate, false)
    } else {
        Predicate::True
    };
    Predicate::and([own_privacy, inherited])
}

fn violation(scope: Scope, message: &str) -> DomainError {
    DomainError::ScopeViolation {
        scope: scope.to_string(),
        message: message.to_string(),
    }
}
