pub mod cache;
pub mod provisioner;
pub mod schema;
pub mod tenant_key;

use cache::TenantCache;
use provisioner::PgProvisioner;

/// The cache as the application uses it: one PostgreSQL pool per tenant.
pub type TenantDbCache = TenantCache<PgProvisioner>;

/// Re-run provisioning for every tenant database already on the server
/// (idempotent, safe to call on every startup).
pub async fn warm_existing_tenants(cache: &TenantDbCache) -> anyhow::Result<()> {
    let keys = cache.provisioner().list_tenant_keys().await?;
    let total = keys.len();
    let ready = cache.warm(keys).await;
    tracing::info!("Warmed {ready}/{total} existing tenant database(s)");
    Ok(())
}
