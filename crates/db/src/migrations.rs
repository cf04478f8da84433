use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of forward migrations shipped with the binary.
pub fn known_count() -> usize {
    MIGRATOR.iter().filter(|migration| !migration.migration_type.is_down_migration()).count()
}

/// Forward migrations not yet recorded as applied in `pool`.
pub async fn pending_count(pool: &DbPool) -> Result<usize, sqlx::Error> {
    let ledger: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_optional(pool)
    .await?;
    let applied: i64 = match ledger {
        Some(_) => {
            sqlx::query_scalar("SELECT COUNT(1) FROM _sqlx_migrations WHERE success = 1")
                .fetch_one(pool)
                .await?
        }
        None => 0,
    };
    Ok(known_count().saturating_sub(usize::try_from(applied).unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{known_count, pending_count, run_pending};
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "tenants",
        "products",
        "products_fts",
        "conversation_sessions",
        "customers",
        "cart_items",
        "addresses",
        "orders",
        "order_items",
        "idx_products_tenant_stock",
        "idx_conversation_sessions_updated_at",
        "idx_cart_items_customer_id",
        "idx_addresses_customer_id",
        "idx_orders_customer_created",
        "products_fts_ai",
        "products_fts_ad",
        "products_fts_au",
    ];

    async fn object_count(pool: &sqlx::SqlitePool, kind: &str, name: &str) -> i64 {
        sqlx::query("SELECT COUNT(*) AS count FROM sqlite_master WHERE type = ?1 AND name = ?2")
            .bind(kind)
            .bind(name)
            .fetch_one(pool)
            .await
            .expect("query sqlite_master")
            .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in [
            "tenants",
            "products",
            "products_fts",
            "conversation_sessions",
            "customers",
            "cart_items",
            "addresses",
            "orders",
            "order_items",
        ] {
            assert_eq!(object_count(&pool, "table", table).await, 1, "missing table {table}");
        }
        for trigger in ["products_fts_ai", "products_fts_ad", "products_fts_au"] {
            assert_eq!(object_count(&pool, "trigger", trigger).await, 1, "missing {trigger}");
        }
    }

    #[tokio::test]
    async fn pending_count_drops_to_zero_after_running() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        assert_eq!(known_count(), 1);
        assert_eq!(pending_count(&pool).await.expect("pending"), 1);

        run_pending(&pool).await.expect("run migrations");
        assert_eq!(pending_count(&pool).await.expect("pending"), 0);
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert_eq!(object_count(&pool, "table", "products").await, 0);
        assert_eq!(object_count(&pool, "table", "products_fts").await, 0);
        assert_eq!(object_count(&pool, "table", "conversation_sessions").await, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index', 'trigger')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
