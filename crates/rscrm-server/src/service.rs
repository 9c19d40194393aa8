//! Authorization service wiring.
//!
//! Builds the storage backend named by the configuration and connects it,
//! through the adapters, to the domain components the guards use.

use std::sync::Arc;

use rscrm_domain::{CollaboratorService, OwnershipOracle, PermissionService, ScopeResolver};
use rscrm_storage::{
    DataStore, HealthStatus, MemoryDataStore, PostgresConfig, PostgresDataStore, StorageError,
    StorageResult,
};
use thiserror::Error;
use tracing::info;

use crate::adapters::{
    DataStoreGrantStore, DataStoreOwnershipReader, DataStorePermissionStore, DataStoreTeamReader,
};
use crate::config::{AuthorizationSettings, ConfigLoadError, ServerConfig, StorageSettings};

pub type Reader = DataStoreOwnershipReader<dyn DataStore>;
pub type Permissions = DataStorePermissionStore<dyn DataStore>;
pub type Grants = DataStoreGrantStore<dyn DataStore>;
pub type Teams = DataStoreTeamReader<dyn DataStore>;
pub type Oracle = OwnershipOracle<Reader, Permissions, Grants>;

/// Errors raised while building the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    #[error("failed to initialize storage: {0}")]
    Storage(#[from] StorageError),
}

/// Entry point for every authorization decision made by the server.
pub struct AuthorizationService {
    storage: Arc<dyn DataStore>,
    oracle: Arc<Oracle>,
    scopes: ScopeResolver<Permissions>,
    permissions: PermissionService<Permissions, Teams>,
    collaborators: CollaboratorService<Reader, Permissions, Grants>,
    settings: AuthorizationSettings,
}

impl AuthorizationService {
    /// Wires the domain components over an existing store.
    pub fn new(storage: Arc<dyn DataStore>, settings: AuthorizationSettings) -> Self {
        let reader = Arc::new(DataStoreOwnershipReader::new(Arc::clone(&storage)));
        let permission_store = Arc::new(DataStorePermissionStore::new(Arc::clone(&storage)));
        let grants = Arc::new(DataStoreGrantStore::new(Arc::clone(&storage)));
        let teams = Arc::new(DataStoreTeamReader::new(Arc::clone(&storage)));

        let oracle = Arc::new(OwnershipOracle::new(
            reader,
            Arc::clone(&permission_store),
            Arc::clone(&grants),
        ));

        Self {
            storage,
            scopes: ScopeResolver::new(Arc::clone(&permission_store)),
            permissions: PermissionService::new(permission_store, teams),
            collaborators: CollaboratorService::new(Arc::clone(&oracle), grants),
            oracle,
            settings,
        }
    }

    /// Validates the configuration and connects the configured backend.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let storage = connect_storage(&config.storage).await?;
        Ok(Self::new(storage, config.authorization.clone()))
    }

    pub fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    pub fn scopes(&self) -> &ScopeResolver<Permissions> {
        &self.scopes
    }

    pub fn permissions(&self) -> &PermissionService<Permissions, Teams> {
        &self.permissions
    }

    pub fn collaborators(&self) -> &CollaboratorService<Reader, Permissions, Grants> {
        &self.collaborators
    }

    pub fn settings(&self) -> &AuthorizationSettings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<dyn DataStore> {
        &self.storage
    }

    /// Checks the backing store.
    pub async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.storage.health_check().await
    }
}

async fn connect_storage(settings: &StorageSettings) -> Result<Arc<dyn DataStore>, ServiceError> {
    match settings.backend.as_str() {
        "memory" => {
            info!("using in-memory storage");
            let store: Arc<dyn DataStore> = MemoryDataStore::new_shared();
            Ok(store)
        }
        "postgres" => {
            let database_url = settings.database_url.clone().ok_or_else(|| {
                ConfigLoadError::Invalid {
                    message: "storage.database_url is required when backend is 'postgres'"
                        .to_string(),
                }
            })?;
            let config = PostgresConfig {
                database_url,
                max_connections: settings.pool_size,
                connect_timeout_secs: settings.connection_timeout_secs,
                ..Default::default()
            };
            info!(?config, "connecting to PostgreSQL");
            let store = PostgresDataStore::from_config(&config).await?;
            if settings.run_migrations {
                store.run_migrations().await?;
            }
            let store: Arc<dyn DataStore> = Arc::new(store);
            Ok(store)
        }
        other => Err(ConfigLoadError::Invalid {
            message: format!("unsupported storage backend: {other}"),
        }
        .into()),
    }
}
