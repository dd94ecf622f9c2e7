use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    middleware::tenant::TenantDb,
    models::user::SaveUserRequest,
    services::users::UserService,
};

fn session_email(db: &TenantDb) -> Result<&str, (StatusCode, Json<Value>)> {
    db.session
        .email
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, Json(json!({ "error": "No user email found in session" }))))
}

/// GET /me: the caller's row in their tenant database.
pub async fn get_current_user(db: TenantDb) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let email = session_email(&db)?;
    let user = UserService::find_by_email(&db.pool, email)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))))?
        .ok_or((StatusCode::NOT_FOUND, Json(json!({ "error": "User not found in tenant database" }))))?;

    Ok(Json(json!({ "user": user })))
}

/// PUT /me: registers the caller in their tenant database or refreshes their name.
pub async fn save_current_user(
    db: TenantDb,
    body: Option<Json<SaveUserRequest>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let email = session_email(&db)?;
    let name = body
        .and_then(|Json(b)| b.user_name)
        .or_else(|| db.session.name.clone());

    let user = UserService::save(&db.pool, email, name.as_deref())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))))?;

    Ok(Json(json!({ "user": user })))
}
