use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;

use crate::{
    db::tenant_key::{resolve, TenantKey},
    models::auth::OrgSession,
    AppState,
};

/// The caller's tenant database, provisioned on first use.
///
/// The pool is shared with every other request for the same tenant; handlers
/// use it for the duration of the request and never close it.
#[derive(Debug, Clone)]
pub struct TenantDb {
    pub key: TenantKey,
    pub pool: PgPool,
    pub session: OrgSession,
}

impl FromRequestParts<AppState> for TenantDb {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = OrgSession::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        let key = resolve(&session.organization_id).map_err(IntoResponse::into_response)?;
        let pool = state
            .tenants
            .get_or_create(&key)
            .await
            .map_err(IntoResponse::into_response)?;

        Ok(TenantDb { key, pool, session })
    }
}
