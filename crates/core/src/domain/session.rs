use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::commerce::OrderId;
use crate::domain::product::{CatalogProduct, ProductId};
use crate::domain::tenant::TenantId;

/// Identifies one conversation: a tenant plus the customer's channel identity
/// (typically a phone number).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub tenant_id: TenantId,
    pub identity: String,
}

impl SessionKey {
    pub fn new(tenant_id: TenantId, identity: impl Into<String>) -> Self {
        Self { tenant_id, identity: identity.into() }
    }

    /// Identity with everything but the last four characters hidden, for logs.
    pub fn masked_identity(&self) -> String {
        let chars: Vec<char> = self.identity.chars().collect();
        let visible = chars.len().min(4);
        let hidden = chars.len() - visible;
        let tail: String = chars[hidden..].iter().collect();
        format!("{}{}", "*".repeat(hidden), tail)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { role: Role::User, content: content.into(), at }
    }

    pub fn assistant(content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { role: Role::Assistant, content: content.into(), at }
    }
}

/// A product the customer can refer to by its session-scoped number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReference {
    pub sequential_id: u32,
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub discounted_price: Option<Decimal>,
    pub description: String,
}

impl ProductReference {
    pub fn from_product(sequential_id: u32, product: &CatalogProduct) -> Self {
        Self {
            sequential_id,
            product_id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            discounted_price: product.discounted_price(),
            description: product.description.clone(),
        }
    }

    pub fn effective_price(&self) -> Decimal {
        self.discounted_price.unwrap_or(self.price)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderListEntry {
    pub sequence: u32,
    pub order_id: OrderId,
    pub number: String,
}

/// Short-lived state handed from one tool to a later one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ScratchValue {
    OrderList(Vec<OrderListEntry>),
    Text(String),
}

/// Durable copy of the parts of a session that survive a restart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub key: SessionKey,
    pub history: Vec<Turn>,
    pub product_list: Vec<ProductReference>,
    pub sequence_counter: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{ScratchValue, SessionKey};
    use crate::domain::tenant::TenantId;

    #[test]
    fn masked_identity_keeps_last_four_characters() {
        let key = SessionKey::new(TenantId("t-1".to_string()), "5561999991234");
        assert_eq!(key.masked_identity(), "*********1234");

        let short = SessionKey::new(TenantId("t-1".to_string()), "12");
        assert_eq!(short.masked_identity(), "12");
    }

    #[test]
    fn keys_with_colliding_concatenations_stay_distinct() {
        let left = SessionKey::new(TenantId("a:b".to_string()), "c");
        let right = SessionKey::new(TenantId("a".to_string()), "b:c");
        assert_ne!(left, right);
    }

    #[test]
    fn scratch_values_serialize_with_kind_tag() {
        let value = ScratchValue::Text("awaiting confirmation".to_string());
        let json = serde_json::to_value(&value).expect("serialize scratch");
        assert_eq!(json["kind"], "text");
    }
}
