pub mod catalog;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;

pub use catalog::filters::{SearchFilters, SortKey};
pub use catalog::money::{format_money, format_price};
pub use catalog::vocabulary::{SynonymVocabulary, TokenGroup};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::commerce::{
    cart_total, Address, AddressId, CartItem, Customer, CustomerId, NewAddress, Order, OrderId,
    OrderItem, OrderStatus,
};
pub use domain::product::{CatalogProduct, ProductId};
pub use domain::session::{
    OrderListEntry, ProductReference, Role, ScratchValue, SessionKey, SessionSnapshot, Turn,
};
pub use domain::tenant::{DeliveryCoverage, TenantId, TenantProfile};
pub use errors::{DomainError, InterfaceError};
