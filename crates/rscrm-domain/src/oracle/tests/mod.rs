//! Tests for the ownership oracle.
//!
//! Organized by functionality:
//! - System admin bypass and ownership
//! - Lead privacy and appointment inheritance
//! - Brokerage and team visibility
//! - Collaborator grants
//! - Modify / delete overlay rules
//! - Fail-closed behavior
