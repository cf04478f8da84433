use sqlx::Row;

use storefront_core::domain::commerce::{Customer, CustomerId};
use storefront_core::domain::tenant::TenantId;

use super::{format_timestamp, new_id, parse_timestamp, CustomerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, identity, name, email, created_at FROM customers WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_customer(r)?)),
            None => Ok(None),
        }
    }
}

pub(crate) fn row_to_customer(row: &sqlx::sqlite::SqliteRow) -> Result<Customer, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let identity: String =
        row.try_get("identity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: Option<String> =
        row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: Option<String> =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Customer {
        id: CustomerId(id),
        tenant_id: TenantId(tenant_id),
        identity,
        name,
        email,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn get_or_create(
        &self,
        tenant_id: &TenantId,
        identity: &str,
    ) -> Result<Customer, RepositoryError> {
        sqlx::query(
            "INSERT INTO customers (id, tenant_id, identity, name, email, created_at)
             VALUES (?, ?, ?, NULL, NULL, ?)
             ON CONFLICT(tenant_id, identity) DO NOTHING",
        )
        .bind(new_id())
        .bind(&tenant_id.0)
        .bind(identity)
        .bind(format_timestamp(chrono::Utc::now()))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, tenant_id, identity, name, email, created_at
             FROM customers WHERE tenant_id = ? AND identity = ?",
        )
        .bind(&tenant_id.0)
        .bind(identity)
        .fetch_one(&self.pool)
        .await?;

        row_to_customer(&row)
    }

    async fn update_profile(
        &self,
        id: &CustomerId,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<Customer, RepositoryError> {
        let result = sqlx::query(
            "UPDATE customers SET name = COALESCE(?, name), email = COALESCE(?, email) WHERE id = ?",
        )
        .bind(name)
        .bind(email)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("customer {}", id.0)));
        }

        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("customer {}", id.0)))
    }
}
