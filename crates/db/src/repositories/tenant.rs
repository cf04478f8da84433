use sqlx::Row;

use storefront_core::domain::tenant::{TenantId, TenantProfile};

use super::{format_timestamp, parse_decimal, RepositoryError, TenantRepository};
use crate::DbPool;

pub struct SqlTenantRepository {
    pool: DbPool,
}

impl SqlTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<TenantProfile, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let store_name: String =
        row.try_get("store_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let store_address: Option<String> =
        row.try_get("store_address").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let zones_json: String =
        row.try_get("delivery_zones").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let delivery_fee: String =
        row.try_get("delivery_fee").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let hours_json: Option<String> =
        row.try_get("business_hours").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let delivery_zones: Vec<String> = serde_json::from_str(&zones_json)
        .map_err(|e| RepositoryError::Decode(format!("delivery_zones: {e}")))?;
    let business_hours = hours_json
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("business_hours: {e}")))?;

    Ok(TenantProfile {
        id: TenantId(id),
        store_name,
        store_address,
        delivery_zones,
        delivery_fee: parse_decimal("delivery_fee", &delivery_fee)?,
        business_hours,
    })
}

#[async_trait::async_trait]
impl TenantRepository for SqlTenantRepository {
    async fn find_profile(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, store_name, store_address, delivery_zones, delivery_fee, business_hours
             FROM tenants WHERE id = ?",
        )
        .bind(&tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_profile(r)?)),
            None => Ok(None),
        }
    }

    async fn save_profile(&self, profile: TenantProfile) -> Result<(), RepositoryError> {
        let zones_json = serde_json::to_string(&profile.delivery_zones)
            .map_err(|e| RepositoryError::Decode(format!("delivery_zones: {e}")))?;
        let hours_json = profile
            .business_hours
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Decode(format!("business_hours: {e}")))?;

        sqlx::query(
            "INSERT INTO tenants (id, store_name, store_address, delivery_zones, delivery_fee,
                                  business_hours, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 store_name = excluded.store_name,
                 store_address = excluded.store_address,
                 delivery_zones = excluded.delivery_zones,
                 delivery_fee = excluded.delivery_fee,
                 business_hours = excluded.business_hours",
        )
        .bind(&profile.id.0)
        .bind(&profile.store_name)
        .bind(&profile.store_address)
        .bind(zones_json)
        .bind(profile.delivery_fee.to_string())
        .bind(hours_json)
        .bind(format_timestamp(chrono::Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;
    use rust_decimal::Decimal;

    use storefront_core::domain::hours::{BusinessHours, DayHours};
    use storefront_core::domain::tenant::{DeliveryCoverage, TenantId, TenantProfile};

    use super::SqlTenantRepository;
    use crate::repositories::TenantRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn profile_round_trip_keeps_delivery_zones() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlTenantRepository::new(pool);

        let profile = TenantProfile {
            id: TenantId("farmacia-central".to_string()),
            store_name: "Farmácia Central".to_string(),
            store_address: Some("SCS Quadra 2, Brasília/DF".to_string()),
            delivery_zones: vec!["Brasília".to_string(), "Águas Claras/Norte".to_string()],
            delivery_fee: Decimal::new(800, 2),
            business_hours: None,
        };
        repo.save_profile(profile.clone()).await.expect("save profile");

        let found = repo.find_profile(&profile.id).await.expect("find").expect("profile exists");
        assert_eq!(found, profile);
        assert_eq!(
            found.coverage("brasilia ", None),
            DeliveryCoverage::NotServed,
            "accents are significant in zone names"
        );
        assert_eq!(
            found.coverage("Brasília", Some("Asa Sul")),
            DeliveryCoverage::Served { fee: Decimal::new(800, 2) }
        );
        assert!(repo
            .find_profile(&TenantId("unknown".to_string()))
            .await
            .expect("find unknown")
            .is_none());
    }

    #[tokio::test]
    async fn business_hours_survive_a_round_trip() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlTenantRepository::new(pool);

        let eight_to_six = DayHours::new(
            NaiveTime::from_hms_opt(8, 0, 0).expect("time"),
            NaiveTime::from_hms_opt(18, 0, 0).expect("time"),
        );
        let mut hours = BusinessHours::every_day(-180, eight_to_six);
        hours.week[6] = None;
        let profile = TenantProfile {
            business_hours: Some(hours),
            ..TenantProfile::placeholder(TenantId("drogaria-24h".to_string()))
        };
        repo.save_profile(profile.clone()).await.expect("save profile");

        let found = repo.find_profile(&profile.id).await.expect("find").expect("profile exists");
        assert_eq!(found.business_hours, profile.business_hours);

        repo.save_profile(TenantProfile { business_hours: None, ..profile.clone() })
            .await
            .expect("clear hours");
        let found = repo.find_profile(&profile.id).await.expect("find").expect("profile exists");
        assert_eq!(found.business_hours, None);
    }
}
