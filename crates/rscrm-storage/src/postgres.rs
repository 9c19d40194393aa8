//! PostgreSQL storage implementation.
//!
//! Resource tables (`escrows`, `clients`, `listings`, `leads`,
//! `appointments`), `users` and `teams` belong to the CRM and are only read
//! here.
//! [`PostgresDataStore::run_migrations`] creates the two tables the engine
//! owns: `user_permissions` and `data_access_control`.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, instrument};

use crate::error::{HealthStatus, PoolStats, StorageError, StorageResult};
use crate::traits::{
    table_has_lead_link, table_has_privacy_flag, validate_grant, validate_permissions,
    validate_resource_table, DataStore, StoredGrant, StoredPermissions, StoredResource, StoredUser,
};

/// Default health check timeout in seconds.
const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// PostgreSQL configuration options.
#[derive(Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    pub min_connections: u32,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Timeout for health checks in seconds.
    pub health_check_timeout_secs: u64,
}

// Custom Debug implementation to hide credentials in database_url
impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("health_check_timeout_secs", &self.health_check_timeout_secs)
            .finish()
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/rscrm".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
        }
    }
}

/// PostgreSQL implementation of DataStore.
pub struct PostgresDataStore {
    pool: PgPool,
    health_check_timeout: Duration,
}

impl PostgresDataStore {
    /// Creates a new PostgreSQL data store from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            health_check_timeout: Duration::from_secs(DEFAULT_HEALTH_CHECK_TIMEOUT_SECS),
        }
    }

    /// Creates a new PostgreSQL data store with the given configuration.
    #[instrument(skip(config))]
    pub async fn from_config(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| StorageError::ConnectionError {
                message: e.to_string(),
            })?;

        Ok(Self {
            pool,
            health_check_timeout: Duration::from_secs(config.health_check_timeout_secs),
        })
    }

    /// Creates a new PostgreSQL data store from a database URL.
    pub async fn from_url(database_url: &str) -> StorageResult<Self> {
        let config = PostgresConfig {
            database_url: database_url.to_string(),
            ..Default::default()
        };
        Self::from_config(&config).await
    }

    /// Runs database migrations to create the engine-owned tables.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> StorageResult<()> {
        debug!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_permissions (
                user_id VARCHAR(255) NOT NULL,
                team_id VARCHAR(255) NOT NULL,
                can_delete BOOLEAN NOT NULL DEFAULT FALSE,
                can_edit_team_data BOOLEAN NOT NULL DEFAULT FALSE,
                can_view_financials BOOLEAN NOT NULL DEFAULT FALSE,
                can_manage_team BOOLEAN NOT NULL DEFAULT FALSE,
                is_broker_admin BOOLEAN NOT NULL DEFAULT FALSE,
                is_team_admin BOOLEAN NOT NULL DEFAULT FALSE,
                granted_by VARCHAR(255),
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                PRIMARY KEY (user_id, team_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError {
            message: format!("Failed to create user_permissions table: {e}"),
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS data_access_control (
                resource_type VARCHAR(255) NOT NULL,
                resource_id VARCHAR(255) NOT NULL,
                user_id VARCHAR(255) NOT NULL,
                can_view BOOLEAN NOT NULL DEFAULT FALSE,
                can_edit BOOLEAN NOT NULL DEFAULT FALSE,
                can_delete BOOLEAN NOT NULL DEFAULT FALSE,
                granted_by VARCHAR(255),
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                PRIMARY KEY (resource_type, resource_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError {
            message: format!("Failed to create data_access_control table: {e}"),
        })?;

        debug!("Database migrations completed");
        Ok(())
    }

    /// Records the query duration histogram around a storage future.
    async fn timed<T, F>(&self, operation: &'static str, future: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        let start = Instant::now();
        let result = future.await;
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::histogram!(
            "rscrm_storage_query_duration_seconds",
            "operation" => operation,
            "backend" => "postgres",
            "status" => status
        )
        .record(start.elapsed().as_secs_f64());
        result
    }
}

/// Builds the point read for a resource table.
///
/// Columns the table lacks are selected as typed NULLs so every table decodes
/// the same way. Identifiers are compared as text so UUID and text keys both work.
fn resource_select_sql(table: &str) -> String {
    // A NULL flag reads as open, the same as the rendered list filter.
    let is_private = if table_has_privacy_flag(table) {
        "COALESCE(is_private, FALSE)"
    } else {
        "NULL::boolean"
    };
    let lead_id = if table_has_lead_link(table) {
        "lead_id::text"
    } else {
        "NULL::text"
    };
    format!(
        "SELECT id::text AS id, owner_id::text AS owner_id, team_id::text AS team_id, \
         {is_private} AS is_private, {lead_id} AS lead_id \
         FROM {table} WHERE id::text = $1"
    )
}

fn decode_error(e: sqlx::Error) -> StorageError {
    StorageError::QueryError {
        message: format!("Failed to decode row: {e}"),
    }
}

fn row_to_permissions(row: PgRow) -> StorageResult<StoredPermissions> {
    Ok(StoredPermissions {
        user_id: row.try_get("user_id").map_err(decode_error)?,
        team_id: row.try_get("team_id").map_err(decode_error)?,
        can_delete: row.try_get("can_delete").map_err(decode_error)?,
        can_edit_team_data: row.try_get("can_edit_team_data").map_err(decode_error)?,
        can_view_financials: row.try_get("can_view_financials").map_err(decode_error)?,
        can_manage_team: row.try_get("can_manage_team").map_err(decode_error)?,
        is_broker_admin: row.try_get("is_broker_admin").map_err(decode_error)?,
        is_team_admin: row.try_get("is_team_admin").map_err(decode_error)?,
        granted_by: row.try_get("granted_by").map_err(decode_error)?,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(decode_error)?,
    })
}

fn row_to_grant(row: PgRow) -> StorageResult<StoredGrant> {
    Ok(StoredGrant {
        resource_type: row.try_get("resource_type").map_err(decode_error)?,
        resource_id: row.try_get("resource_id").map_err(decode_error)?,
        user_id: row.try_get("user_id").map_err(decode_error)?,
        can_view: row.try_get("can_view").map_err(decode_error)?,
        can_edit: row.try_get("can_edit").map_err(decode_error)?,
        can_delete: row.try_get("can_delete").map_err(decode_error)?,
        granted_by: row.try_get("granted_by").map_err(decode_error)?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(decode_error)?,
    })
}

const GRANT_COLUMNS: &str =
    "resource_type, resource_id, user_id, can_view, can_edit, can_delete, granted_by, created_at";

#[async_trait]
impl DataStore for PostgresDataStore {
    #[instrument(skip(self))]
    async fn get_resource(&self, table: &str, id: &str) -> StorageResult<StoredResource> {
        validate_resource_table(table)?;
        let sql = resource_select_sql(table);

        self.timed("get_resource", async {
            let row = sqlx::query(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError {
                    message: format!("Failed to read {table} row: {e}"),
                })?
                .ok_or_else(|| StorageError::ResourceNotFound {
                    table: table.to_string(),
                    id: id.to_string(),
                })?;

            Ok(StoredResource {
                id: row.try_get("id").map_err(decode_error)?,
                owner_id: row.try_get("owner_id").map_err(decode_error)?,
                team_id: row.try_get("team_id").map_err(decode_error)?,
                is_private: row.try_get("is_private").map_err(decode_error)?,
                lead_id: row.try_get("lead_id").map_err(decode_error)?,
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_user_broker(&self, user_id: &str) -> StorageResult<Option<String>> {
        self.timed("get_user_broker", async {
            let broker: Option<Option<String>> =
                sqlx::query_scalar("SELECT broker_id::text FROM users WHERE id::text = $1")
                    .bind(user_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StorageError::QueryError {
                        message: format!("Failed to read user broker: {e}"),
                    })?;
            Ok(broker.flatten())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_team_broker(&self, team_id: &str) -> StorageResult<Option<String>> {
        self.timed("get_team_broker", async {
            let broker: Option<Option<String>> = sqlx::query_scalar(
                "SELECT primary_broker_id::text FROM teams WHERE team_id::text = $1",
            )
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError {
                message: format!("Failed to read team broker: {e}"),
            })?;
            Ok(broker.flatten())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_team_member(
        &self,
        user_id: &str,
        team_id: &str,
    ) -> StorageResult<Option<StoredUser>> {
        self.timed("get_team_member", async {
            let row = sqlx::query(
                r#"
                SELECT id::text AS id, broker_id::text AS broker_id,
                       team_id::text AS team_id, role::text AS role
                FROM users
                WHERE id::text = $1 AND team_id::text = $2
                "#,
            )
            .bind(user_id)
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError {
                message: format!("Failed to read team member: {e}"),
            })?;
            row.map(|row| -> StorageResult<StoredUser> {
                Ok(StoredUser {
                    id: row.try_get("id").map_err(decode_error)?,
                    broker_id: row.try_get("broker_id").map_err(decode_error)?,
                    team_id: row.try_get("team_id").map_err(decode_error)?,
                    role: row.try_get("role").map_err(decode_error)?,
                })
            })
            .transpose()
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_permissions(
        &self,
        user_id: &str,
        team_id: &str,
    ) -> StorageResult<Option<StoredPermissions>> {
        self.timed("get_permissions", async {
            let row = sqlx::query(
                r#"
                SELECT user_id, team_id, can_delete, can_edit_team_data, can_view_financials,
                       can_manage_team, is_broker_admin, is_team_admin, granted_by, updated_at
                FROM user_permissions
                WHERE user_id = $1 AND team_id = $2
                "#,
            )
            .bind(user_id)
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError {
                message: format!("Failed to read permissions: {e}"),
            })?;
            row.map(row_to_permissions).transpose()
        })
        .await
    }

    #[instrument(skip(self, permissions), fields(user_id = %permissions.user_id, team_id = %permissions.team_id))]
    async fn upsert_permissions(&self, permissions: StoredPermissions) -> StorageResult<()> {
        validate_permissions(&permissions)?;

        self.timed("upsert_permissions", async {
            sqlx::query(
                r#"
                INSERT INTO user_permissions (
                    user_id, team_id, can_delete, can_edit_team_data,
                    can_view_financials, can_manage_team, is_broker_admin,
                    is_team_admin, granted_by, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (user_id, team_id)
                DO UPDATE SET
                    can_delete = EXCLUDED.can_delete,
                    can_edit_team_data = EXCLUDED.can_edit_team_data,
                    can_view_financials = EXCLUDED.can_view_financials,
                    can_manage_team = EXCLUDED.can_manage_team,
                    is_broker_admin = EXCLUDED.is_broker_admin,
                    is_team_admin = EXCLUDED.is_team_admin,
                    granted_by = EXCLUDED.granted_by,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(&permissions.user_id)
            .bind(&permissions.team_id)
            .bind(permissions.can_delete)
            .bind(permissions.can_edit_team_data)
            .bind(permissions.can_view_financials)
            .bind(permissions.can_manage_team)
            .bind(permissions.is_broker_admin)
            .bind(permissions.is_team_admin)
            .bind(&permissions.granted_by)
            .bind(permissions.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError {
                message: format!("Failed to upsert permissions: {e}"),
            })?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_permissions(&self, user_id: &str, team_id: &str) -> StorageResult<bool> {
        self.timed("delete_permissions", async {
            let result =
                sqlx::query("DELETE FROM user_permissions WHERE user_id = $1 AND team_id = $2")
                    .bind(user_id)
                    .bind(team_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::QueryError {
                        message: format!("Failed to delete permissions: {e}"),
                    })?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_grant(
        &self,
        resource_type: &str,
        resource_id: &str,
        user_id: &str,
    ) -> StorageResult<Option<StoredGrant>> {
        let sql = format!(
            "SELECT {GRANT_COLUMNS} FROM data_access_control \
             WHERE resource_type = $1 AND resource_id = $2 AND user_id = $3"
        );
        self.timed("get_grant", async {
            let row = sqlx::query(&sql)
                .bind(resource_type)
                .bind(resource_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError {
                    message: format!("Failed to read grant: {e}"),
                })?;
            row.map(row_to_grant).transpose()
        })
        .await
    }

    #[instrument(skip(self, grant), fields(resource_type = %grant.resource_type, resource_id = %grant.resource_id))]
    async fn upsert_grant(&self, grant: StoredGrant) -> StorageResult<()> {
        validate_grant(&grant)?;

        self.timed("upsert_grant", async {
            // created_at is left untouched on conflict.
            sqlx::query(
                r#"
                INSERT INTO data_access_control (
                    resource_type, resource_id, user_id, can_view, can_edit,
                    can_delete, granted_by, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (resource_type, resource_id, user_id)
                DO UPDATE SET
                    can_view = EXCLUDED.can_view,
                    can_edit = EXCLUDED.can_edit,
                    can_delete = EXCLUDED.can_delete,
                    granted_by = EXCLUDED.granted_by
                "#,
            )
            .bind(&grant.resource_type)
            .bind(&grant.resource_id)
            .bind(&grant.user_id)
            .bind(grant.can_view)
            .bind(grant.can_edit)
            .bind(grant.can_delete)
            .bind(&grant.granted_by)
            .bind(grant.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError {
                message: format!("Failed to upsert grant: {e}"),
            })?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_grant(
        &self,
        resource_type: &str,
        resource_id: &str,
        user_id: &str,
    ) -> StorageResult<bool> {
        self.timed("delete_grant", async {
            let result = sqlx::query(
                "DELETE FROM data_access_control \
                 WHERE resource_type = $1 AND resource_id = $2 AND user_id = $3",
            )
            .bind(resource_type)
            .bind(resource_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError {
                message: format!("Failed to delete grant: {e}"),
            })?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_grants(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> StorageResult<Vec<StoredGrant>> {
        let sql = format!(
            "SELECT {GRANT_COLUMNS} FROM data_access_control \
             WHERE resource_type = $1 AND resource_id = $2 ORDER BY user_id"
        );
        self.timed("list_grants", async {
            let rows = sqlx::query(&sql)
                .bind(resource_type)
                .bind(resource_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError {
                    message: format!("Failed to list grants: {e}"),
                })?;
            rows.into_iter().map(row_to_grant).collect()
        })
        .await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let start = Instant::now();

        let check_result = tokio::time::timeout(self.health_check_timeout, async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::HealthCheckFailed {
                    message: format!("database ping failed: {e}"),
                })
        })
        .await;

        let latency = start.elapsed();

        let status = match &check_result {
            Ok(Ok(_)) => "success",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        metrics::histogram!(
            "rscrm_storage_health_check_duration_seconds",
            "backend" => "postgres",
            "status" => status
        )
        .record(latency.as_secs_f64());

        match check_result {
            Ok(result) => {
                result?;
            }
            Err(_elapsed) => {
                return Err(StorageError::HealthCheckFailed {
                    message: format!(
                        "database ping timed out after {:?}",
                        self.health_check_timeout
                    ),
                });
            }
        }

        // pool.size() counts every open connection, idle ones included.
        let total_connections = self.pool.size();
        let idle_connections = self.pool.num_idle() as u32;
        let active_connections = total_connections.saturating_sub(idle_connections);
        let max_connections = self.pool.options().get_max_connections();

        Ok(HealthStatus {
            healthy: true,
            latency,
            pool_stats: Some(PoolStats {
                active_connections,
                idle_connections,
                max_connections,
            }),
            message: Some("postgresql".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_debug_redacts_url() {
        let config = PostgresConfig {
            database_url: "postgres://user:secret@db/rscrm".to_string(),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_lead_select_reads_privacy_column() {
        let sql = resource_select_sql("leads");
        assert!(sql.contains("COALESCE(is_private, FALSE) AS is_private"));
        assert!(sql.contains("NULL::text AS lead_id"));
        assert!(sql.contains("FROM leads WHERE id::text = $1"));
    }

    #[test]
    fn test_appointment_select_reads_lead_link() {
        let sql = resource_select_sql("appointments");
        assert!(sql.contains("NULL::boolean AS is_private"));
        assert!(sql.contains("lead_id::text AS lead_id"));
    }

    #[test]
    fn test_plain_resource_select() {
        let sql = resource_select_sql("escrows");
        assert!(sql.contains("NULL::boolean AS is_private"));
        assert!(sql.contains("NULL::text AS lead_id"));
        assert!(sql.contains("FROM escrows"));
    }
}
