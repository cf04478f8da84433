use chrono::{DateTime, Utc};
use sqlx::Row;

use storefront_core::domain::session::{ProductReference, SessionKey, SessionSnapshot, Turn};
use storefront_core::domain::tenant::TenantId;

use super::{format_timestamp, parse_count, parse_timestamp, RepositoryError, SessionSnapshotRepository};
use crate::DbPool;

pub struct SqlSessionSnapshotRepository {
    pool: DbPool,
}

impl SqlSessionSnapshotRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_snapshot(row: &sqlx::sqlite::SqliteRow) -> Result<SessionSnapshot, RepositoryError> {
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let identity: String =
        row.try_get("identity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let history_json: String =
        row.try_get("history").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let product_list_json: String =
        row.try_get("product_list").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sequence_counter: i64 =
        row.try_get("sequence_counter").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let history: Vec<Turn> = serde_json::from_str(&history_json)
        .map_err(|e| RepositoryError::Decode(format!("history: {e}")))?;
    let product_list: Vec<ProductReference> = serde_json::from_str(&product_list_json)
        .map_err(|e| RepositoryError::Decode(format!("product_list: {e}")))?;

    Ok(SessionSnapshot {
        key: SessionKey::new(TenantId(tenant_id), identity),
        history,
        product_list,
        sequence_counter: parse_count("sequence_counter", sequence_counter)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl SessionSnapshotRepository for SqlSessionSnapshotRepository {
    async fn upsert(&self, snapshot: &SessionSnapshot) -> Result<(), RepositoryError> {
        let history_json = serde_json::to_string(&snapshot.history)
            .map_err(|e| RepositoryError::Decode(format!("history: {e}")))?;
        let product_list_json = serde_json::to_string(&snapshot.product_list)
            .map_err(|e| RepositoryError::Decode(format!("product_list: {e}")))?;

        sqlx::query(
            "INSERT INTO conversation_sessions (tenant_id, identity, history, product_list,
                                                sequence_counter, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, identity) DO UPDATE SET
                 history = excluded.history,
                 product_list = excluded.product_list,
                 sequence_counter = excluded.sequence_counter,
                 updated_at = excluded.updated_at",
        )
        .bind(&snapshot.key.tenant_id.0)
        .bind(&snapshot.key.identity)
        .bind(history_json)
        .bind(product_list_json)
        .bind(i64::from(snapshot.sequence_counter))
        .bind(format_timestamp(snapshot.created_at))
        .bind(format_timestamp(snapshot.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, key: &SessionKey) -> Result<Option<SessionSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, identity, history, product_list, sequence_counter,
                    created_at, updated_at
             FROM conversation_sessions WHERE tenant_id = ? AND identity = ?",
        )
        .bind(&key.tenant_id.0)
        .bind(&key.identity)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_snapshot(r)?)),
            None => Ok(None),
        }
    }

    async fn load_recent(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<SessionSnapshot>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT tenant_id, identity, history, product_list, sequence_counter,
                    created_at, updated_at
             FROM conversation_sessions
             WHERE updated_at >= ?
             ORDER BY updated_at DESC",
        )
        .bind(format_timestamp(since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_snapshot).collect::<Result<Vec<_>, _>>()
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM conversation_sessions WHERE tenant_id = ? AND identity = ?")
            .bind(&key.tenant_id.0)
            .bind(&key.identity)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use storefront_core::domain::product::ProductId;
    use storefront_core::domain::session::{ProductReference, SessionKey, SessionSnapshot, Turn};
    use storefront_core::domain::tenant::TenantId;

    use super::SqlSessionSnapshotRepository;
    use crate::repositories::SessionSnapshotRepository;
    use crate::{connect_with_settings, migrations};

    fn snapshot(identity: &str, updated_hours_ago: i64) -> SessionSnapshot {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).single().expect("timestamp");
        let updated_at = now - Duration::hours(updated_hours_ago);
        SessionSnapshot {
            key: SessionKey::new(TenantId("t-1".to_string()), identity),
            history: vec![
                Turn::user("tem dipirona?", updated_at),
                Turn::assistant("1. Dipirona 500mg - R$ 12,90", updated_at),
            ],
            product_list: vec![ProductReference {
                sequential_id: 1,
                product_id: ProductId("p-1".to_string()),
                name: "Dipirona 500mg".to_string(),
                price: Decimal::new(1290, 2),
                discounted_price: None,
                description: String::new(),
            }],
            sequence_counter: 1,
            created_at: updated_at - Duration::minutes(5),
            updated_at,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_previous_snapshot() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlSessionSnapshotRepository::new(pool);

        let mut first = snapshot("5561999990001", 2);
        repo.upsert(&first).await.expect("first upsert");

        first.sequence_counter = 7;
        first.product_list.clear();
        repo.upsert(&first).await.expect("second upsert");

        let found = repo.find(&first.key).await.expect("find").expect("snapshot exists");
        assert_eq!(found, first);
    }

    #[tokio::test]
    async fn load_recent_filters_by_update_time() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlSessionSnapshotRepository::new(pool);

        let fresh = snapshot("5561999990001", 1);
        let stale = snapshot("5561999990002", 48);
        repo.upsert(&fresh).await.expect("upsert fresh");
        repo.upsert(&stale).await.expect("upsert stale");

        let since = fresh.updated_at - Duration::hours(24);
        let recent = repo.load_recent(since).await.expect("load recent");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].key, fresh.key);

        repo.delete(&fresh.key).await.expect("delete");
        assert!(repo.find(&fresh.key).await.expect("find").is_none());
    }
}
