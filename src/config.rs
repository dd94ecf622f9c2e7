use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::db::cache::CacheOptions;
use crate::db::tenant_key::MAX_PREFIX_LEN;

#[derive(Debug, Clone)]
pub struct Config {
    // PostgreSQL server shared by every tenant database
    pub pg_host: String,
    pub pg_port: u16,
    pub pg_user: String,
    pub pg_password: String,
    pub pg_admin_db: String,
    // Tenant databases
    pub tenant_db_prefix: String,
    pub tenant_pool_max_connections: u32,
    pub tenant_pool_acquire_timeout_secs: u64,
    pub provision_timeout_secs: u64,
    pub tenant_cache_capacity: Option<usize>,
    pub warm_tenants_on_startup: bool,
    // HTTP
    pub session_jwt_secret: String,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            pg_host: required("PG_HOST")?,
            pg_port: env::var("PG_PORT")
                .unwrap_or_else(|_| "5432".into())
                .parse()?,
            pg_user: required("PG_USER")?,
            pg_password: required("PG_PASSWORD")?,
            pg_admin_db: env::var("PG_ADMIN_DB").unwrap_or_else(|_| "postgres".into()),
            tenant_db_prefix: env::var("TENANT_DB_PREFIX").unwrap_or_else(|_| "tenant_".into()),
            tenant_pool_max_connections: env::var("TENANT_POOL_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            tenant_pool_acquire_timeout_secs: env::var("TENANT_POOL_ACQUIRE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".into())
                .parse()?,
            provision_timeout_secs: env::var("PROVISION_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".into())
                .parse()?,
            tenant_cache_capacity: match env::var("TENANT_CACHE_CAPACITY").ok().filter(|s| !s.is_empty()) {
                Some(v) => Some(v.parse()?),
                None => None,
            },
            warm_tenants_on_startup: env::var("WARM_TENANTS_ON_STARTUP")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            session_jwt_secret: required("SESSION_JWT_SECRET")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !is_valid_prefix(&self.tenant_db_prefix) {
            anyhow::bail!(
                "TENANT_DB_PREFIX must start with a lowercase letter, use only [a-z0-9_] and be at most {} bytes",
                MAX_PREFIX_LEN
            );
        }
        if self.tenant_pool_max_connections == 0 {
            anyhow::bail!("TENANT_POOL_MAX_CONNECTIONS must be at least 1");
        }
        if self.provision_timeout_secs == 0 {
            anyhow::bail!("PROVISION_TIMEOUT_SECS must be at least 1");
        }
        if self.tenant_cache_capacity == Some(0) {
            anyhow::bail!("TENANT_CACHE_CAPACITY must be at least 1 when set");
        }
        Ok(())
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            provision_timeout: Duration::from_secs(self.provision_timeout_secs),
            capacity: self.tenant_cache_capacity.and_then(NonZeroUsize::new),
        }
    }
}

/// The prefix is spliced into `CREATE DATABASE`, so it is held to the same
/// alphabet as encoded tenant keys.
fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.len() <= MAX_PREFIX_LEN
        && prefix.starts_with(|c: char| c.is_ascii_lowercase())
        && prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
