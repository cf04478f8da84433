use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: String,
    pub brand: String,
    /// Comma separated, as entered by the merchant.
    pub tags: String,
    pub sku: String,
    pub category: Option<String>,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub stock_quantity: u32,
}

impl CatalogProduct {
    /// The price the customer pays: the sale price when one is set and non-zero.
    pub fn effective_price(&self) -> Decimal {
        match self.sale_price {
            Some(sale) if sale > Decimal::ZERO => sale,
            _ => self.price,
        }
    }

    pub fn discounted_price(&self) -> Option<Decimal> {
        self.sale_price.filter(|sale| *sale > Decimal::ZERO)
    }

    pub fn is_available(&self) -> bool {
        self.stock_quantity > 0
    }

    pub fn has_stock_for(&self, quantity: u32) -> bool {
        self.stock_quantity >= quantity
    }
}
