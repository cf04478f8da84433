use sqlx::Row;

use storefront_core::domain::commerce::{Address, AddressId, CustomerId, NewAddress};

use super::{format_timestamp, new_id, AddressRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAddressRepository {
    pool: DbPool,
}

impl SqlAddressRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_address(row: &sqlx::sqlite::SqliteRow) -> Result<Address, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_id: String =
        row.try_get("customer_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let street: String =
        row.try_get("street").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let number: String =
        row.try_get("number").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let neighborhood: String =
        row.try_get("neighborhood").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let city: String = row.try_get("city").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let state: String = row.try_get("state").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let zip_code: String =
        row.try_get("zip_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let complement: Option<String> =
        row.try_get("complement").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_default: bool =
        row.try_get("is_default").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Address {
        id: AddressId(id),
        customer_id: CustomerId(customer_id),
        street,
        number,
        neighborhood,
        city,
        state,
        zip_code,
        complement,
        is_default,
    })
}

#[async_trait::async_trait]
impl AddressRepository for SqlAddressRepository {
    async fn list(&self, customer_id: &CustomerId) -> Result<Vec<Address>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, customer_id, street, number, neighborhood, city, state, zip_code,
                    complement, is_default
             FROM addresses WHERE customer_id = ?
             ORDER BY is_default DESC, created_at ASC, rowid ASC",
        )
        .bind(&customer_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_address).collect::<Result<Vec<_>, _>>()
    }

    async fn add(
        &self,
        customer_id: &CustomerId,
        address: NewAddress,
        make_default: bool,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM addresses WHERE customer_id = ?")
                .bind(&customer_id.0)
                .fetch_one(&mut *tx)
                .await?;
        let is_default = make_default || existing == 0;

        if is_default {
            sqlx::query("UPDATE addresses SET is_default = 0 WHERE customer_id = ?")
                .bind(&customer_id.0)
                .execute(&mut *tx)
                .await?;
        }

        let id = new_id();
        sqlx::query(
            "INSERT INTO addresses (id, customer_id, street, number, neighborhood, city, state,
                                    zip_code, complement, is_default, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&customer_id.0)
        .bind(&address.street)
        .bind(&address.number)
        .bind(&address.neighborhood)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.zip_code)
        .bind(&address.complement)
        .bind(is_default)
        .bind(format_timestamp(chrono::Utc::now()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Address {
            id: AddressId(id),
            customer_id: customer_id.clone(),
            street: address.street,
            number: address.number,
            neighborhood: address.neighborhood,
            city: address.city,
            state: address.state,
            zip_code: address.zip_code,
            complement: address.complement,
            is_default,
        })
    }

    async fn set_default(
        &self,
        customer_id: &CustomerId,
        address_id: &AddressId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let found: Option<String> =
            sqlx::query_scalar("SELECT id FROM addresses WHERE customer_id = ? AND id = ?")
                .bind(&customer_id.0)
                .bind(&address_id.0)
                .fetch_optional(&mut *tx)
                .await?;
        if found.is_none() {
            return Err(RepositoryError::NotFound(format!("address {}", address_id.0)));
        }

        sqlx::query("UPDATE addresses SET is_default = (id = ?) WHERE customer_id = ?")
            .bind(&address_id.0)
            .bind(&customer_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
