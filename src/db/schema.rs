use sqlx::PgPool;

use crate::error::TenantDbError;

/// One bootstrap table: its name, full DDL and the tables its foreign keys point at.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub ddl: &'static str,
    pub references: &'static [&'static str],
}

/// Extension that provides `uuid_generate_v4()` for the primary-key defaults.
pub const UUID_EXTENSION: &str = r#"CREATE EXTENSION IF NOT EXISTS "uuid-ossp""#;

/// Tables every tenant database must contain, referenced tables first.
pub const BOOTSTRAP_SCHEMA: &[TableSpec] = &[
    TableSpec {
        name: "user",
        ddl: r#"CREATE TABLE IF NOT EXISTS "user" (
            user_id    UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            user_name  TEXT,
            user_email TEXT UNIQUE
        )"#,
        references: &[],
    },
    TableSpec {
        name: "prompt_template",
        ddl: r#"CREATE TABLE IF NOT EXISTS prompt_template (
            prompt_id      UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            prompt_name    TEXT,
            prompt_content TEXT
        )"#,
        references: &[],
    },
    TableSpec {
        name: "mcp_data",
        ddl: r#"CREATE TABLE IF NOT EXISTS mcp_data (
            mcp_id      UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            mcp_name    TEXT,
            mcp_details TEXT,
            mcp_icon    TEXT
        )"#,
        references: &[],
    },
    TableSpec {
        name: "mcp_connection",
        ddl: r#"CREATE TABLE IF NOT EXISTS mcp_connection (
            user_id   UUID NOT NULL REFERENCES "user"(user_id),
            mcp_id    UUID NOT NULL REFERENCES mcp_data(mcp_id),
            mcp_token TEXT,
            status    TEXT,
            PRIMARY KEY (user_id, mcp_id)
        )"#,
        references: &["user", "mcp_data"],
    },
    TableSpec {
        name: "file_history",
        ddl: r#"CREATE TABLE IF NOT EXISTS file_history (
            file_id     UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            file_name   TEXT,
            file_url    TEXT,
            file_type   TEXT,
            file_status TEXT,
            user_id     UUID REFERENCES "user"(user_id)
        )"#,
        references: &["user"],
    },
    TableSpec {
        name: "chat_category",
        ddl: r#"CREATE TABLE IF NOT EXISTS chat_category (
            chat_category_id   UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            chat_category_name TEXT
        )"#,
        references: &[],
    },
    TableSpec {
        name: "chat_history",
        ddl: r#"CREATE TABLE IF NOT EXISTS chat_history (
            chat_id          UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            chat_category_id UUID REFERENCES chat_category(chat_category_id),
            role             TEXT,
            content          TEXT
        )"#,
        references: &["chat_category"],
    },
];

/// Makes sure every bootstrap table exists in the tenant database behind `pool`.
///
/// Idempotent and cheap on an initialized database. The whole pass runs in
/// one transaction so a failure leaves no partially created schema behind.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), TenantDbError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| TenantDbError::schema("<transaction>", e))?;

    sqlx::query(UUID_EXTENSION)
        .execute(&mut *tx)
        .await
        .map_err(|e| TenantDbError::schema("<uuid-ossp>", e))?;

    let mut created = 0usize;
    for table in BOOTSTRAP_SCHEMA {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
               SELECT 1 FROM information_schema.tables
               WHERE table_schema = current_schema() AND table_name = $1
             )",
        )
        .bind(table.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| TenantDbError::schema(table.name, e))?;

        if exists {
            continue;
        }

        sqlx::query(table.ddl)
            .execute(&mut *tx)
            .await
            .map_err(|e| TenantDbError::schema(table.name, e))?;
        created += 1;
        tracing::debug!("Created bootstrap table {}", table.name);
    }

    tx.commit()
        .await
        .map_err(|e| TenantDbError::schema("<commit>", e))?;

    if created > 0 {
        tracing::info!("Bootstrap schema initialized ({created} table(s) created)");
    }
    Ok(())
}
