use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Row, Sqlite, Transaction};

use storefront_core::domain::commerce::{
    cart_total, Address, CustomerId, Order, OrderId, OrderItem, OrderStatus,
};
use storefront_core::domain::product::ProductId;
use storefront_core::domain::tenant::TenantId;
use storefront_core::errors::DomainError;

use super::cart::row_to_item;
use super::{
    format_timestamp, new_id, parse_count, parse_decimal, parse_timestamp, OrderRepository,
    RepositoryError,
};
use crate::DbPool;

const ORDER_COLUMNS: &str =
    "id, tenant_id, customer_id, number, status, total, delivery_fee, delivery_address, created_at";

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_id: &str) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT product_id, name, quantity, unit_price
             FROM order_items WHERE order_id = ? ORDER BY position ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let product_id: String =
                    row.try_get("product_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let name: String =
                    row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let quantity: i64 =
                    row.try_get("quantity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let unit_price: String =
                    row.try_get("unit_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(OrderItem {
                    product_id: ProductId(product_id),
                    name,
                    quantity: parse_count("quantity", quantity)?,
                    unit_price: parse_decimal("unit_price", &unit_price)?,
                })
            })
            .collect()
    }

    async fn hydrate(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
        let mut order = row_to_order(row)?;
        order.items = self.load_items(&order.id.0).await?;
        Ok(order)
    }
}

/// Order numbers are short, upper-case and unique per tenant.
pub fn generate_order_number() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("ORD-{}", raw[..8].to_uppercase())
}

/// Decrements stock only when enough is left, so concurrent orders cannot oversell. Returning
/// an error drops `tx`, which rolls the whole order back.
async fn take_stock(
    tx: &mut Transaction<'_, Sqlite>,
    tenant_id: &TenantId,
    item: &OrderItem,
) -> Result<(), RepositoryError> {
    let quantity = i64::from(item.quantity);
    let updated = sqlx::query(
        "UPDATE products SET stock_quantity = stock_quantity - ?
         WHERE id = ? AND tenant_id = ? AND stock_quantity >= ?",
    )
    .bind(quantity)
    .bind(&item.product_id.0)
    .bind(&tenant_id.0)
    .bind(quantity)
    .execute(&mut **tx)
    .await?;
    if updated.rows_affected() > 0 {
        return Ok(());
    }

    let available: Option<i64> =
        sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = ? AND tenant_id = ?")
            .bind(&item.product_id.0)
            .bind(&tenant_id.0)
            .fetch_optional(&mut **tx)
            .await?;
    let error = match available {
        Some(available) => DomainError::InsufficientStock {
            product: item.name.clone(),
            requested: item.quantity,
            available: parse_count("stock_quantity", available)?,
        },
        None => DomainError::ProductUnavailable { product: item.name.clone() },
    };
    Err(error.into())
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_id: String =
        row.try_get("customer_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let number: String =
        row.try_get("number").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total: String = row.try_get("total").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let delivery_fee: String =
        row.try_get("delivery_fee").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let address_json: String =
        row.try_get("delivery_address").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = OrderStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{status}`")))?;
    let delivery_address: Address = serde_json::from_str(&address_json)
        .map_err(|e| RepositoryError::Decode(format!("delivery_address: {e}")))?;

    Ok(Order {
        id: OrderId(id),
        tenant_id: TenantId(tenant_id),
        customer_id: CustomerId(customer_id),
        number,
        status,
        items: Vec::new(),
        total: parse_decimal("total", &total)?,
        delivery_fee: parse_decimal("delivery_fee", &delivery_fee)?,
        delivery_address,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn create_from_cart(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
        delivery_address: &Address,
        delivery_fee: Decimal,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT id, product_id, name, quantity, unit_price
             FROM cart_items WHERE customer_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&customer_id.0)
        .fetch_all(&mut *tx)
        .await?;
        let cart = rows.iter().map(row_to_item).collect::<Result<Vec<_>, _>>()?;
        if cart.is_empty() {
            return Err(DomainError::EmptyCart.into());
        }

        let address_json = serde_json::to_string(delivery_address)
            .map_err(|e| RepositoryError::Decode(format!("delivery_address: {e}")))?;
        let order = Order {
            id: OrderId(new_id()),
            tenant_id: tenant_id.clone(),
            customer_id: customer_id.clone(),
            number: generate_order_number(),
            status: OrderStatus::Pending,
            items: cart
                .iter()
                .map(|item| OrderItem {
                    product_id: item.product_id.clone(),
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            total: cart_total(&cart) + delivery_fee,
            delivery_fee,
            delivery_address: delivery_address.clone(),
            created_at: Utc::now(),
        };

        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&order.id.0)
        .bind(&order.tenant_id.0)
        .bind(&order.customer_id.0)
        .bind(&order.number)
        .bind(order.status.as_str())
        .bind(order.total.to_string())
        .bind(order.delivery_fee.to_string())
        .bind(address_json)
        .bind(format_timestamp(order.created_at))
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (order_id, position, product_id, name, quantity, unit_price)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&order.id.0)
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .bind(&item.product_id.0)
            .bind(&item.name)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.to_string())
            .execute(&mut *tx)
            .await?;

            take_stock(&mut tx, &order.tenant_id, item).await?;
        }

        sqlx::query("DELETE FROM cart_items WHERE customer_id = ?")
            .bind(&customer_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn list_for_customer(
        &self,
        customer_id: &CustomerId,
        limit: usize,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = ?
             ORDER BY created_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(&customer_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(self.hydrate(row).await?);
        }
        Ok(orders)
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(self.hydrate(r).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_number(
        &self,
        tenant_id: &TenantId,
        number: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = ? AND UPPER(number) = UPPER(?)"
        ))
        .bind(&tenant_id.0)
        .bind(number.trim())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(self.hydrate(r).await?)),
            None => Ok(None),
        }
    }

    async fn cancel(&self, id: &OrderId) -> Result<Order, RepositoryError> {
        let result = sqlx::query("UPDATE orders SET status = ? WHERE id = ? AND status = ?")
            .bind(OrderStatus::Cancelled.as_str())
            .bind(&id.0)
            .bind(OrderStatus::Pending.as_str())
            .execute(&self.pool)
            .await?;

        let order = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", id.0)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotCancellable {
                order_number: order.number,
                status: order.status.label().to_lowercase(),
            }
            .into());
        }
        Ok(order)
    }
}
