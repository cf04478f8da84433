use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use storefront_core::catalog::filters::{SearchFilters, SortKey};
use storefront_core::catalog::vocabulary::TokenGroup;
use storefront_core::domain::commerce::{
    Address, AddressId, CartItem, Customer, CustomerId, NewAddress, Order, OrderId,
};
use storefront_core::domain::product::{CatalogProduct, ProductId};
use storefront_core::domain::session::{SessionKey, SessionSnapshot};
use storefront_core::domain::tenant::{TenantId, TenantProfile};
use storefront_core::errors::DomainError;

pub mod address;
pub mod cart;
pub mod catalog;
pub mod customer;
pub mod memory;
pub mod order;
pub mod session_snapshot;
pub mod tenant;

pub use address::SqlAddressRepository;
pub use cart::SqlCartRepository;
pub use catalog::SqlCatalogRepository;
pub use customer::SqlCustomerRepository;
pub use memory::{
    InMemoryCatalogRepository, InMemoryCommerceRepository, InMemorySessionSnapshotRepository,
    InMemoryTenantRepository,
};
pub use order::SqlOrderRepository;
pub use session_snapshot::SqlSessionSnapshotRepository;
pub use tenant::SqlTenantRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// How a catalog search decides whether a product matches the text of the query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Every in-stock product of the tenant.
    All,
    /// Full-text index; every group must match through at least one of its terms.
    FullText(Vec<TokenGroup>),
    /// Case-insensitive substring of the product name.
    NameContains(String),
    /// Like `FullText` but by substring over name, description, brand, tags and SKU.
    AnyField(Vec<TokenGroup>),
}

impl MatchStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::FullText(_) => "full_text",
            Self::NameContains(_) => "name_contains",
            Self::AnyField(_) => "any_field",
        }
    }
}

/// A catalog lookup: the match strategy plus the hard filters every strategy honours.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogQuery {
    pub strategy: MatchStrategy,
    pub brand: Option<String>,
    pub tags: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: SortKey,
    /// `0` means no cap.
    pub limit: usize,
}

impl CatalogQuery {
    pub fn new(strategy: MatchStrategy, filters: &SearchFilters) -> Self {
        Self {
            strategy,
            brand: filters.brand.clone(),
            tags: filters.tags.clone(),
            min_price: filters.min_price,
            max_price: filters.max_price,
            sort: filters.sort,
            limit: filters.limit,
        }
    }

    pub fn all() -> Self {
        Self::new(MatchStrategy::All, &SearchFilters::default())
    }

    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            query: String::new(),
            brand: self.brand.clone(),
            tags: self.tags.clone(),
            min_price: self.min_price,
            max_price: self.max_price,
            limit: self.limit,
            sort: self.sort,
        }
    }
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ProductId,
    ) -> Result<Option<CatalogProduct>, RepositoryError>;

    /// Products for the given ids, in the order of `ids`; unknown ids are skipped.
    async fn find_by_ids(
        &self,
        tenant_id: &TenantId,
        ids: &[ProductId],
    ) -> Result<Vec<CatalogProduct>, RepositoryError>;

    async fn find_by_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<CatalogProduct>, RepositoryError>;

    async fn search(
        &self,
        tenant_id: &TenantId,
        query: &CatalogQuery,
    ) -> Result<Vec<CatalogProduct>, RepositoryError>;

    async fn save(&self, product: CatalogProduct) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SessionSnapshotRepository: Send + Sync {
    async fn upsert(&self, snapshot: &SessionSnapshot) -> Result<(), RepositoryError>;

    async fn find(&self, key: &SessionKey) -> Result<Option<SessionSnapshot>, RepositoryError>;

    /// Snapshots updated at or after `since`, most recent first.
    async fn load_recent(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<SessionSnapshot>, RepositoryError>;

    async fn delete(&self, key: &SessionKey) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn get_or_create(
        &self,
        tenant_id: &TenantId,
        identity: &str,
    ) -> Result<Customer, RepositoryError>;

    async fn update_profile(
        &self,
        id: &CustomerId,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<Customer, RepositoryError>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Cart lines in insertion order.
    async fn items(&self, customer_id: &CustomerId) -> Result<Vec<CartItem>, RepositoryError>;

    /// Adds `quantity` units, merging into an existing line for the same product.
    async fn add_item(
        &self,
        customer_id: &CustomerId,
        product: &CatalogProduct,
        quantity: u32,
    ) -> Result<CartItem, RepositoryError>;

    async fn update_quantity(
        &self,
        customer_id: &CustomerId,
        item_id: &str,
        quantity: u32,
    ) -> Result<CartItem, RepositoryError>;

    async fn remove_item(
        &self,
        customer_id: &CustomerId,
        item_id: &str,
    ) -> Result<(), RepositoryError>;

    async fn clear(&self, customer_id: &CustomerId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Turns the customer's cart into a pending order, takes the ordered units out of stock
    /// and empties the cart, all or nothing. Fails with [`DomainError::InsufficientStock`]
    /// when another order took the units first.
    async fn create_from_cart(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
        delivery_address: &Address,
        delivery_fee: Decimal,
    ) -> Result<Order, RepositoryError>;

    /// Most recent first.
    async fn list_for_customer(
        &self,
        customer_id: &CustomerId,
        limit: usize,
    ) -> Result<Vec<Order>, RepositoryError>;

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn find_by_number(
        &self,
        tenant_id: &TenantId,
        number: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Fails with [`DomainError::NotCancellable`] unless the order is still pending.
    async fn cancel(&self, id: &OrderId) -> Result<Order, RepositoryError>;
}

#[async_trait]
pub trait AddressRepository: Send + Sync {
    /// Default address first, then oldest first.
    async fn list(&self, customer_id: &CustomerId) -> Result<Vec<Address>, RepositoryError>;

    /// Stores the address; the first address of a customer, or any added with
    /// `make_default`, becomes the single default.
    async fn add(
        &self,
        customer_id: &CustomerId,
        address: NewAddress,
        make_default: bool,
    ) -> Result<Address, RepositoryError>;

    async fn set_default(
        &self,
        customer_id: &CustomerId,
        address_id: &AddressId,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_profile(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantProfile>, RepositoryError>;

    async fn save_profile(&self, profile: TenantProfile) -> Result<(), RepositoryError>;
}

pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value.trim())
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn parse_count(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{column}: {value} is out of range")))
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
