//! Decision types returned by the ownership oracle.

use std::fmt;

/// Which rule decided an access, modify or delete check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionReason {
    /// System administrators bypass every rule.
    SystemAdmin,
    /// The identity owns the resource.
    Owner,
    /// The resource does not exist (indistinguishable from a denial to callers).
    NotFound,
    /// The linked parent is private to another user.
    InheritedPrivacy,
    /// The resource itself is private to another user.
    PrivateResource,
    /// The resource owner belongs to the broker's brokerage.
    Brokerage,
    /// The resource belongs to the identity's team.
    Team,
    /// The overlay extends the identity's rights over team resources.
    TeamOverlay,
    /// An explicit collaborator grant covers the operation.
    Collaborator,
    /// No rule granted the operation.
    NoMatch,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionReason::SystemAdmin => "system_admin",
            DecisionReason::Owner => "owner",
            DecisionReason::NotFound => "not_found",
            DecisionReason::InheritedPrivacy => "inherited_privacy",
            DecisionReason::PrivateResource => "private_resource",
            DecisionReason::Brokerage => "brokerage",
            DecisionReason::Team => "team",
            DecisionReason::TeamOverlay => "team_overlay",
            DecisionReason::Collaborator => "collaborator",
            DecisionReason::NoMatch => "no_match",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl AccessDecision {
    pub fn allow(reason: DecisionReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    pub fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}
