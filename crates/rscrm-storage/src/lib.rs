//! rscrm-storage: Storage abstraction layer
//!
//! This crate provides the storage abstraction for rscrm, including:
//! - DataStore trait for the point reads and keyed upserts the engine needs
//! - In-memory implementation for testing
//! - PostgreSQL implementation for production
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rscrm-storage                 │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - DataStore trait definition   │
//! │  memory.rs   - In-memory implementation     │
//! │  postgres.rs - PostgreSQL implementation    │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

// Re-export commonly used types
pub use error::{HealthStatus, PoolStats, StorageError, StorageResult};
pub use memory::MemoryDataStore;
pub use postgres::{PostgresConfig, PostgresDataStore};
pub use traits::{
    DataStore, StoredGrant, StoredPermissions, StoredResource, StoredTeam, StoredUser,
    RESOURCE_TABLES,
};
