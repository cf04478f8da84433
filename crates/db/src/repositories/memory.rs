use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use storefront_core::catalog::filters::{
    apply_limit, contains_ignore_case, sort_by_availability, sort_products, SortKey,
};
use storefront_core::catalog::vocabulary::{tokenize, TokenGroup};
use storefront_core::domain::commerce::{
    cart_total, Address, AddressId, CartItem, Customer, CustomerId, NewAddress, Order, OrderId,
    OrderItem, OrderStatus,
};
use storefront_core::domain::product::{CatalogProduct, ProductId};
use storefront_core::domain::session::{SessionKey, SessionSnapshot};
use storefront_core::domain::tenant::{TenantId, TenantProfile};
use storefront_core::errors::DomainError;

use super::order::generate_order_number;
use super::{
    new_id, AddressRepository, CartRepository, CatalogQuery, CatalogRepository,
    CustomerRepository, MatchStrategy, OrderRepository, RepositoryError,
    SessionSnapshotRepository, TenantRepository,
};

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    products: RwLock<HashMap<String, CatalogProduct>>,
}

impl InMemoryCatalogRepository {
    pub fn with_products(products: impl IntoIterator<Item = CatalogProduct>) -> Self {
        let products = products.into_iter().map(|product| (product.id.0.clone(), product)).collect();
        Self { products: RwLock::new(products) }
    }

    /// Takes every line out of stock, or none of them when one line cannot be covered.
    pub async fn take_stock(
        &self,
        tenant_id: &TenantId,
        items: &[OrderItem],
    ) -> Result<(), DomainError> {
        let mut products = self.products.write().await;
        for item in items {
            let product = products
                .get(&item.product_id.0)
                .filter(|product| &product.tenant_id == tenant_id)
                .ok_or_else(|| DomainError::ProductUnavailable { product: item.name.clone() })?;
            if product.stock_quantity < item.quantity {
                return Err(DomainError::InsufficientStock {
                    product: item.name.clone(),
                    requested: item.quantity,
                    available: product.stock_quantity,
                });
            }
        }
        for item in items {
            if let Some(product) = products.get_mut(&item.product_id.0) {
                product.stock_quantity -= item.quantity;
            }
        }
        Ok(())
    }
}

fn matches_full_text(product: &CatalogProduct, groups: &[TokenGroup]) -> bool {
    let words: Vec<String> = [&product.name, &product.description, &product.brand, &product.tags]
        .iter()
        .flat_map(|field| tokenize(field))
        .collect();
    groups.iter().all(|group| {
        group.terms.iter().any(|term| words.iter().any(|word| word.starts_with(term.as_str())))
    })
}

fn matches_any_field(product: &CatalogProduct, groups: &[TokenGroup]) -> bool {
    let fields = [&product.name, &product.description, &product.brand, &product.tags, &product.sku];
    groups.iter().all(|group| {
        group.terms.iter().any(|term| fields.iter().any(|field| contains_ignore_case(field, term)))
    })
}

fn matches_strategy(product: &CatalogProduct, strategy: &MatchStrategy) -> bool {
    match strategy {
        MatchStrategy::All => true,
        MatchStrategy::FullText(groups) => !groups.is_empty() && matches_full_text(product, groups),
        MatchStrategy::NameContains(text) => {
            !text.trim().is_empty() && contains_ignore_case(&product.name, text)
        }
        MatchStrategy::AnyField(groups) => !groups.is_empty() && matches_any_field(product, groups),
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ProductId,
    ) -> Result<Option<CatalogProduct>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.get(&id.0).filter(|product| &product.tenant_id == tenant_id).cloned())
    }

    async fn find_by_ids(
        &self,
        tenant_id: &TenantId,
        ids: &[ProductId],
    ) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let products = self.products.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| products.get(&id.0))
            .filter(|product| &product.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn find_by_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let products = self.products.read().await;
        let mut found: Vec<CatalogProduct> =
            products.values().filter(|product| &product.tenant_id == tenant_id).cloned().collect();
        sort_products(&mut found, SortKey::NameAsc);
        Ok(found)
    }

    async fn search(
        &self,
        tenant_id: &TenantId,
        query: &CatalogQuery,
    ) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let filters = query.filters();
        let products = self.products.read().await;
        let mut found: Vec<CatalogProduct> = products
            .values()
            .filter(|product| &product.tenant_id == tenant_id)
            .filter(|product| filters.admits(product))
            .filter(|product| matches_strategy(product, &query.strategy))
            .cloned()
            .collect();

        match query.sort {
            SortKey::Relevance => sort_by_availability(&mut found),
            sort => sort_products(&mut found, sort),
        }
        apply_limit(&mut found, query.limit);
        Ok(found)
    }

    async fn save(&self, product: CatalogProduct) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        products.insert(product.id.0.clone(), product);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionSnapshotRepository {
    snapshots: RwLock<HashMap<SessionKey, SessionSnapshot>>,
}

impl InMemorySessionSnapshotRepository {
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionSnapshotRepository for InMemorySessionSnapshotRepository {
    async fn upsert(&self, snapshot: &SessionSnapshot) -> Result<(), RepositoryError> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.key.clone(), snapshot.clone());
        Ok(())
    }

    async fn find(&self, key: &SessionKey) -> Result<Option<SessionSnapshot>, RepositoryError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(key).cloned())
    }

    async fn load_recent(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<SessionSnapshot>, RepositoryError> {
        let snapshots = self.snapshots.read().await;
        let mut recent: Vec<SessionSnapshot> =
            snapshots.values().filter(|snapshot| snapshot.updated_at >= since).cloned().collect();
        recent.sort_by(|left, right| right.updated_at.cmp(&left.updated_at));
        Ok(recent)
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), RepositoryError> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTenantRepository {
    profiles: RwLock<HashMap<TenantId, TenantProfile>>,
}

#[async_trait::async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find_profile(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantProfile>, RepositoryError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(tenant_id).cloned())
    }

    async fn save_profile(&self, profile: TenantProfile) -> Result<(), RepositoryError> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.id.clone(), profile);
        Ok(())
    }
}

#[derive(Default)]
struct CommerceState {
    customers: HashMap<CustomerId, Customer>,
    carts: HashMap<CustomerId, Vec<CartItem>>,
    addresses: HashMap<CustomerId, Vec<Address>>,
    orders: Vec<Order>,
}

/// Customers, carts, addresses and orders behind one lock, so that turning a cart into an
/// order is atomic the way the SQL transaction is. Stock is only tracked when a catalog is
/// attached.
#[derive(Default)]
pub struct InMemoryCommerceRepository {
    state: RwLock<CommerceState>,
    catalog: Option<Arc<InMemoryCatalogRepository>>,
}

impl InMemoryCommerceRepository {
    pub fn with_catalog(catalog: Arc<InMemoryCatalogRepository>) -> Self {
        Self { state: RwLock::default(), catalog: Some(catalog) }
    }
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryCommerceRepository {
    async fn get_or_create(
        &self,
        tenant_id: &TenantId,
        identity: &str,
    ) -> Result<Customer, RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .customers
            .values()
            .find(|customer| &customer.tenant_id == tenant_id && customer.identity == identity)
        {
            return Ok(existing.clone());
        }

        let customer = Customer {
            id: CustomerId(new_id()),
            tenant_id: tenant_id.clone(),
            identity: identity.to_string(),
            name: None,
            email: None,
            created_at: Utc::now(),
        };
        state.customers.insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn update_profile(
        &self,
        id: &CustomerId,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<Customer, RepositoryError> {
        let mut state = self.state.write().await;
        let customer = state
            .customers
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("customer {}", id.0)))?;
        if name.is_some() {
            customer.name = name;
        }
        if email.is_some() {
            customer.email = email;
        }
        Ok(customer.clone())
    }
}

#[async_trait::async_trait]
impl CartRepository for InMemoryCommerceRepository {
    async fn items(&self, customer_id: &CustomerId) -> Result<Vec<CartItem>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.carts.get(customer_id).cloned().unwrap_or_default())
    }

    async fn add_item(
        &self,
        customer_id: &CustomerId,
        product: &CatalogProduct,
        quantity: u32,
    ) -> Result<CartItem, RepositoryError> {
        let mut state = self.state.write().await;
        let cart = state.carts.entry(customer_id.clone()).or_default();

        if let Some(line) = cart.iter_mut().find(|line| line.product_id == product.id) {
            line.quantity += quantity;
            line.unit_price = product.effective_price();
            return Ok(line.clone());
        }

        let line = CartItem {
            id: new_id(),
            product_id: product.id.clone(),
            name: product.name.clone(),
            quantity,
            unit_price: product.effective_price(),
        };
        cart.push(line.clone());
        Ok(line)
    }

    async fn update_quantity(
        &self,
        customer_id: &CustomerId,
        item_id: &str,
        quantity: u32,
    ) -> Result<CartItem, RepositoryError> {
        let mut state = self.state.write().await;
        let line = state
            .carts
            .get_mut(customer_id)
            .and_then(|cart| cart.iter_mut().find(|line| line.id == item_id))
            .ok_or_else(|| RepositoryError::NotFound(format!("cart item {item_id}")))?;
        line.quantity = quantity;
        Ok(line.clone())
    }

    async fn remove_item(
        &self,
        customer_id: &CustomerId,
        item_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let cart = state.carts.entry(customer_id.clone()).or_default();
        let before = cart.len();
        cart.retain(|line| line.id != item_id);
        if cart.len() == before {
            return Err(RepositoryError::NotFound(format!("cart item {item_id}")));
        }
        Ok(())
    }

    async fn clear(&self, customer_id: &CustomerId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.carts.remove(customer_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryCommerceRepository {
    async fn create_from_cart(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
        delivery_address: &Address,
        delivery_fee: Decimal,
    ) -> Result<Order, RepositoryError> {
        let mut state = self.state.write().await;
        let cart = state.carts.get(customer_id).cloned().unwrap_or_default();
        if cart.is_empty() {
            return Err(DomainError::EmptyCart.into());
        }

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
        if let Some(catalog) = &self.catalog {
            catalog.take_stock(tenant_id, &order.items).await?;
        }
        state.carts.remove(customer_id);
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn list_for_customer(
        &self,
        customer_id: &CustomerId,
        limit: usize,
    ) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|order| &order.customer_id == customer_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|order| &order.id == id).cloned())
    }

    async fn find_by_number(
        &self,
        tenant_id: &TenantId,
        number: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .find(|order| {
                &order.tenant_id == tenant_id && order.number.eq_ignore_ascii_case(number.trim())
            })
            .cloned())
    }

    async fn cancel(&self, id: &OrderId) -> Result<Order, RepositoryError> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .iter_mut()
            .find(|order| &order.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", id.0)))?;
        if !order.status.can_cancel() {
            return Err(DomainError::NotCancellable {
                order_number: order.number.clone(),
                status: order.status.label().to_lowercase(),
            }
            .into());
        }
        order.status = OrderStatus::Cancelled;
        Ok(order.clone())
    }
}

#[async_trait::async_trait]
impl AddressRepository for InMemoryCommerceRepository {
    async fn list(&self, customer_id: &CustomerId) -> Result<Vec<Address>, RepositoryError> {
        let state = self.state.read().await;
        let mut addresses = state.addresses.get(customer_id).cloned().unwrap_or_default();
        addresses.sort_by_key(|address| !address.is_default);
        Ok(addresses)
    }

    async fn add(
        &self,
        customer_id: &CustomerId,
        address: NewAddress,
        make_default: bool,
    ) -> Result<Address, RepositoryError> {
        let mut state = self.state.write().await;
        let saved = state.addresses.entry(customer_id.clone()).or_default();
        let is_default = make_default || saved.is_empty();
        if is_default {
            saved.iter_mut().for_each(|existing| existing.is_default = false);
        }

        let stored = Address {
            id: AddressId(new_id()),
            customer_id: customer_id.clone(),
            street: address.street,
            number: address.number,
            neighborhood: address.neighborhood,
            city: address.city,
            state: address.state,
            zip_code: address.zip_code,
            complement: address.complement,
            is_default,
        };
        saved.push(stored.clone());
        Ok(stored)
    }

    async fn set_default(
        &self,
        customer_id: &CustomerId,
        address_id: &AddressId,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let saved = state.addresses.entry(customer_id.clone()).or_default();
        if !saved.iter().any(|address| &address.id == address_id) {
            return Err(RepositoryError::NotFound(format!("address {}", address_id.0)));
        }
        saved.iter_mut().for_each(|address| address.is_default = &address.id == address_id);
        Ok(())
    }
}
