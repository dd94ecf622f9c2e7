use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Row of the bootstrap `user` table inside a tenant database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct TenantUser {
    pub user_id: Uuid,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveUserRequest {
    pub user_name: Option<String>,
}
