use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool};

use crate::config::Config;
use crate::db::schema;
use crate::db::tenant_key::TenantKey;
use crate::error::TenantDbError;

/// SQLSTATE for `duplicate_database`.
const DUPLICATE_DATABASE: &str = "42P04";
/// SQLSTATE for `unique_violation`; raised on `pg_database` when two sessions race.
const UNIQUE_VIOLATION: &str = "23505";

/// Backend operations the tenant cache drives. Implementations must tolerate
/// being called again for a tenant that is already provisioned.
#[async_trait]
pub trait Provisioner: Send + Sync + 'static {
    /// Shared, internally synchronized handle to one tenant database.
    type Handle: Clone + Send + Sync + 'static;

    fn database_name(&self, key: &TenantKey) -> String;

    /// Creates the tenant database at the server level if it is absent.
    async fn ensure_database_exists(&self, key: &TenantKey) -> Result<(), TenantDbError>;

    async fn open(&self, key: &TenantKey) -> Result<Self::Handle, TenantDbError>;

    /// Creates any missing bootstrap tables.
    async fn ensure_schema(&self, handle: &Self::Handle) -> Result<(), TenantDbError>;

    /// Shuts down a handle that was opened but never handed to a caller.
    async fn close(&self, handle: Self::Handle);
}

/// PostgreSQL implementation: one database per tenant on a shared server.
#[derive(Debug, Clone)]
pub struct PgProvisioner {
    server: PgConnectOptions,
    admin_db: String,
    prefix: String,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PgProvisioner {
    pub fn new(config: &Config) -> Self {
        let server = PgConnectOptions::new()
            .host(&config.pg_host)
            .port(config.pg_port)
            .username(&config.pg_user)
            .password(&config.pg_password);

        Self {
            server,
            admin_db: config.pg_admin_db.clone(),
            prefix: config.tenant_db_prefix.clone(),
            max_connections: config.tenant_pool_max_connections,
            acquire_timeout: Duration::from_secs(config.tenant_pool_acquire_timeout_secs),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Opens a single connection to the control database. Callers close it
    /// as soon as their check is done; it is never pooled or kept.
    async fn admin_connection(&self) -> Result<PgConnection, sqlx::Error> {
        let options = self.server.clone().database(&self.admin_db);
        PgConnection::connect_with(&options).await
    }

    /// Round-trip to the server through the control database.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.admin_connection().await?;
        let result = sqlx::query("SELECT 1").execute(&mut conn).await;
        close_quietly(conn).await;
        result.map(|_| ())
    }

    /// Keys of every tenant database that already exists on the server.
    pub async fn list_tenant_keys(&self) -> Result<Vec<TenantKey>, TenantDbError> {
        let mut conn = self
            .admin_connection()
            .await
            .map_err(|e| TenantDbError::provisioning(&self.admin_db, e))?;

        let names: Result<Vec<String>, sqlx::Error> = sqlx::query_scalar(
            "SELECT datname FROM pg_database
             WHERE NOT datistemplate AND starts_with(datname, $1)
             ORDER BY datname",
        )
        .bind(&self.prefix)
        .fetch_all(&mut conn)
        .await;
        close_quietly(conn).await;

        let names = names.map_err(|e| TenantDbError::provisioning(&self.admin_db, e))?;
        Ok(names
            .iter()
            .filter_map(|name| name.strip_prefix(self.prefix.as_str()))
            .filter_map(TenantKey::from_encoded)
            .collect())
    }

    async fn check_and_create(&self, conn: &mut PgConnection, database: &str) -> Result<(), sqlx::Error> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(database)
                .fetch_one(&mut *conn)
                .await?;

        if exists {
            tracing::debug!("Tenant database exists: {database}");
            return Ok(());
        }

        // `database` is built from a validated TenantKey and prefix; it never contains quotes.
        match sqlx::query(&format!("CREATE DATABASE \"{database}\""))
            .execute(&mut *conn)
            .await
        {
            Ok(_) => {
                tracing::info!("Created tenant database: {database}");
                Ok(())
            }
            Err(e) if is_already_exists(&e) => {
                tracing::info!("Tenant database {database} was created concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Provisioner for PgProvisioner {
    type Handle = PgPool;

    fn database_name(&self, key: &TenantKey) -> String {
        key.database_name(&self.prefix)
    }

    async fn ensure_database_exists(&self, key: &TenantKey) -> Result<(), TenantDbError> {
        let database = self.database_name(key);
        let mut conn = self
            .admin_connection()
            .await
            .map_err(|e| TenantDbError::provisioning(&database, e))?;

        let result = self.check_and_create(&mut conn, &database).await;
        close_quietly(conn).await;
        result.map_err(|e| TenantDbError::provisioning(&database, e))
    }

    async fn open(&self, key: &TenantKey) -> Result<PgPool, TenantDbError> {
        let database = self.database_name(key);
        PgPoolOptions::new()
            .min_connections(0)
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_with(self.server.clone().database(&database))
            .await
            .map_err(|e| TenantDbError::provisioning(&database, e))
    }

    async fn ensure_schema(&self, handle: &PgPool) -> Result<(), TenantDbError> {
        schema::ensure_schema(handle).await
    }

    async fn close(&self, handle: PgPool) {
        handle.close().await;
    }
}

fn is_already_exists(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == DUPLICATE_DATABASE || code == UNIQUE_VIOLATION)
}

async fn close_quietly(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        tracing::warn!("Failed to close admin connection: {e}");
    }
}
