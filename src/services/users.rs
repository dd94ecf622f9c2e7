use sqlx::PgPool;

use crate::models::user::TenantUser;

pub struct UserService;

impl UserService {
    /// Looks up a user in the tenant's bootstrap `user` table by email.
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<TenantUser>, sqlx::Error> {
        sqlx::query_as::<_, TenantUser>(
            r#"SELECT user_id, user_name, user_email FROM "user" WHERE user_email = $1"#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }

    /// Inserts the user on first sight; afterwards only refreshes the display
    /// name (a missing name keeps the stored one).
    pub async fn save(pool: &PgPool, email: &str, name: Option<&str>) -> Result<TenantUser, sqlx::Error> {
        let user = sqlx::query_as::<_, TenantUser>(
            r#"INSERT INTO "user" (user_name, user_email)
               VALUES ($1, $2)
               ON CONFLICT (user_email) DO UPDATE
                 SET user_name = COALESCE(EXCLUDED.user_name, "user".user_name)
               RETURNING user_id, user_name, user_email"#,
        )
        .bind(name)
        .bind(email)
        .fetch_one(pool)
        .await?;

        tracing::info!("Saved tenant user {}", user.user_id);
        Ok(user)
    }
}
