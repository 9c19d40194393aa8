//! Privacy inheritance.
//!
//! A resource's effective visibility comes from two places:
//!
//! - its own `is_private` flag, for types whose metadata declares one (leads)
//! - the flag of the parent it links to, for types with a parent link
//!   (appointments inherit from their lead)
//!
//! Privacy flows down the link only. A lead never becomes private because of
//! an appointment.

use std::sync::Arc;

use tracing::debug;

use crate::error::DomainResult;
use crate::model::{ResourceOwnership, ResourceType};
use crate::traits::OwnershipReader;

/// Who may see a resource as far as privacy is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// No privacy restriction applies.
    Open,
    /// Only the named owner (and system administrators) may see it.
    OwnerOnly { owner_id: String },
}

impl Visibility {
    /// Returns true if the restriction hides the resource from `user_id`.
    pub fn hides_from(&self, user_id: &str) -> bool {
        match self {
            Visibility::Open => false,
            Visibility::OwnerOnly { owner_id } => owner_id != user_id,
        }
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, Visibility::OwnerOnly { .. })
    }
}

/// Visibility from the resource's own privacy flag.
pub fn own_visibility(resource_type: ResourceType, resource: &ResourceOwnership) -> Visibility {
    if resource_type.meta().has_privacy_flag && resource.is_private == Some(true) {
        Visibility::OwnerOnly {
            owner_id: resource.owner_id.clone(),
        }
    } else {
        Visibility::Open
    }
}

/// Resolves privacy inherited through parent links.
pub struct PrivacyResolver<R> {
    reader: Arc<R>,
}

impl<R> PrivacyResolver<R>
where
    R: OwnershipReader + 'static,
{
    pub fn new(reader: Arc<R>) -> Self {
        Self { reader }
    }

    /// Visibility inherited from the linked parent.
    ///
    /// Costs one point read when the type has a parent link and the row
    /// actually links somewhere. A dangling link imposes no restriction.
    pub async fn inherited_visibility(
        &self,
        resource_type: ResourceType,
        resource: &ResourceOwnership,
    ) -> DomainResult<Visibility> {
        let Some(parent_type) = resource_type.meta().parent_link else {
            return Ok(Visibility::Open);
        };
        let Some(parent_id) = resource.lead_id.as_deref() else {
            return Ok(Visibility::Open);
        };

        match self
            .reader
            .get_resource_ownership(parent_type, parent_id)
            .await?
        {
            Some(parent) => Ok(own_visibility(parent_type, &parent)),
            None => {
                debug!(
                    resource_type = %resource_type,
                    resource_id = %resource.id,
                    parent_id,
                    "linked parent not found, no inherited restriction"
                );
                Ok(Visibility::Open)
            }
        }
    }

    /// Combined visibility: the inherited restriction wins over the resource's own flag.
    pub async fn effective_visibility(
        &self,
        resource_type: ResourceType,
        resource: &ResourceOwnership,
    ) -> DomainResult<Visibility> {
        let inherited = self.inherited_visibility(resource_type, resource).await?;
        if inherited.is_restricted() {
            return Ok(inherited);
        }
        Ok(own_visibility(resource_type, resource))
    }
}
