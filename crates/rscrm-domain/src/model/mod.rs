//! Role, resource and permission model.
//!
//! This module contains:
//! - The role hierarchy and capability sets (`Role`, `RoleSet`)
//! - Verified identities
//! - The closed set of resource types and their metadata table
//! - Scopes, permission overlay flags and collaborator grants

mod types;
#[cfg(test)]
mod types_proptest;

pub use types::*;
