use sqlx::Row;

use storefront_core::domain::commerce::{CartItem, CustomerId};
use storefront_core::domain::product::{CatalogProduct, ProductId};

use super::{format_timestamp, new_id, parse_count, parse_decimal, CartRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCartRepository {
    pool: DbPool,
}

impl SqlCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_item(
        &self,
        customer_id: &CustomerId,
        item_id: &str,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, product_id, name, quantity, unit_price
             FROM cart_items WHERE customer_id = ? AND id = ?",
        )
        .bind(&customer_id.0)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_item(r)?)),
            None => Ok(None),
        }
    }
}

pub(crate) fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<CartItem, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let product_id: String =
        row.try_get("product_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let quantity: i64 =
        row.try_get("quantity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let unit_price: String =
        row.try_get("unit_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(CartItem {
        id,
        product_id: ProductId(product_id),
        name,
        quantity: parse_count("quantity", quantity)?,
        unit_price: parse_decimal("unit_price", &unit_price)?,
    })
}

#[async_trait::async_trait]
impl CartRepository for SqlCartRepository {
    async fn items(&self, customer_id: &CustomerId) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, product_id, name, quantity, unit_price
             FROM cart_items WHERE customer_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&customer_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect::<Result<Vec<_>, _>>()
    }

    async fn add_item(
        &self,
        customer_id: &CustomerId,
        product: &CatalogProduct,
        quantity: u32,
    ) -> Result<CartItem, RepositoryError> {
        let row = sqlx::query(
            "INSERT INTO cart_items (id, customer_id, product_id, name, quantity, unit_price, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(customer_id, product_id) DO UPDATE SET
                 quantity = cart_items.quantity + excluded.quantity,
                 unit_price = excluded.unit_price
             RETURNING id, product_id, name, quantity, unit_price",
        )
        .bind(new_id())
        .bind(&customer_id.0)
        .bind(&product.id.0)
        .bind(&product.name)
        .bind(i64::from(quantity))
        .bind(product.effective_price().to_string())
        .bind(format_timestamp(chrono::Utc::now()))
        .fetch_one(&self.pool)
        .await?;

        row_to_item(&row)
    }

    async fn update_quantity(
        &self,
        customer_id: &CustomerId,
        item_id: &str,
        quantity: u32,
    ) -> Result<CartItem, RepositoryError> {
        let result = sqlx::query("UPDATE cart_items SET quantity = ? WHERE customer_id = ? AND id = ?")
            .bind(i64::from(quantity))
            .bind(&customer_id.0)
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("cart item {item_id}")));
        }

        self.find_item(customer_id, item_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("cart item {item_id}")))
    }

    async fn remove_item(
        &self,
        customer_id: &CustomerId,
        item_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE customer_id = ? AND id = ?")
            .bind(&customer_id.0)
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("cart item {item_id}")));
        }
        Ok(())
    }

    async fn clear(&self, customer_id: &CustomerId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_items WHERE customer_id = ?")
            .bind(&customer_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
