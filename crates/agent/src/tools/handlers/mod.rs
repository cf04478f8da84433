//! Tool handlers. Each one takes its typed arguments plus a [`ToolContext`] and returns a
//! [`ToolReply`] or a [`HandlerError`]; none of them render error kinds or log failures, the
//! dispatcher does that.

pub mod cart;
pub mod catalog;
pub mod customer;
pub mod orders;
pub mod store;

use std::sync::Arc;

use thiserror::Error;

use storefront_core::domain::commerce::Customer;
use storefront_core::domain::product::CatalogProduct;
use storefront_core::domain::session::{ProductReference, SessionKey};
use storefront_core::domain::tenant::{TenantId, TenantProfile};
use storefront_core::errors::DomainError;
use storefront_db::repositories::RepositoryError;

use super::{ErrorKind, ToolReply};
use crate::alerts::AlertNotifier;
use crate::retrieval::{RetrievalError, RetrievalPipeline};
use crate::session::{find_by_name, find_by_sequence, SessionStore};
use crate::tools::dispatcher::{CommerceServices, ToolDispatcher};

pub(crate) const LIST_EXPIRED: &str =
    "That list has expired. Send 'products' to see the catalog again.";

const GENERIC_FAILURE: &str =
    "Sorry, I couldn't complete that right now. Please try again in a moment.";

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("catalog search failed: {0}")]
    Retrieval(#[from] RetrievalError),
    #[error("storage failed: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for HandlerError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Domain(rule) => Self::Domain(rule),
            other => Self::Repository(other),
        }
    }
}

impl HandlerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) | Self::Domain(_) => ErrorKind::Conflict,
            Self::Retrieval(_) | Self::Repository(_) => ErrorKind::Persistence,
        }
    }

    /// Text the customer sees; storage failures never leak their details.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(message) | Self::Validation(message) | Self::Conflict(message) => {
                message.clone()
            }
            Self::Domain(rule) => rule.user_message(),
            Self::Retrieval(_) | Self::Repository(_) => GENERIC_FAILURE.to_string(),
        }
    }
}

pub type HandlerResult = Result<ToolReply, HandlerError>;

/// Everything one tool call may touch, scoped to a single dispatch batch.
pub struct ToolContext<'a> {
    dispatcher: &'a ToolDispatcher,
    key: &'a SessionKey,
    /// Refreshed in place when a handler updates the profile, so later tools in the batch see it.
    pub customer: Customer,
    /// The list as the customer last saw it. Numbers and names in this batch resolve against
    /// it even after a handler replaces the session list.
    shown: Vec<ProductReference>,
    list_started: bool,
}

impl<'a> ToolContext<'a> {
    pub fn new(
        dispatcher: &'a ToolDispatcher,
        key: &'a SessionKey,
        customer: Customer,
        shown: Vec<ProductReference>,
    ) -> Self {
        Self { dispatcher, key, customer, shown, list_started: false }
    }

    pub fn key(&self) -> &SessionKey {
        self.key
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.key.tenant_id
    }

    pub fn sessions(&self) -> &SessionStore {
        self.dispatcher.sessions()
    }

    pub fn services(&self) -> &CommerceServices {
        self.dispatcher.services()
    }

    pub fn retrieval(&self) -> &RetrievalPipeline {
        self.dispatcher.retrieval()
    }

    pub fn alerts(&self) -> Arc<dyn AlertNotifier> {
        self.dispatcher.alerts()
    }

    pub fn default_limit(&self) -> usize {
        self.dispatcher.default_limit()
    }

    pub fn shown(&self) -> &[ProductReference] {
        &self.shown
    }

    pub fn shown_by_sequence(&self, sequence: u32) -> Option<&ProductReference> {
        find_by_sequence(&self.shown, sequence)
    }

    pub fn shown_by_name(&self, text: &str) -> Option<&ProductReference> {
        find_by_name(&self.shown, text)
    }

    /// Makes products referenceable by number. The first list of a batch replaces the
    /// session list; later ones extend it so numbers stay unique across the whole reply.
    /// An empty result leaves the current list alone.
    pub async fn remember_products(&mut self, products: &[CatalogProduct]) -> Vec<ProductReference> {
        if products.is_empty() {
            return Vec::new();
        }
        if self.list_started {
            self.sessions().append_product_list(self.key, products).await
        } else {
            self.list_started = true;
            self.sessions().store_product_list(self.key, products).await
        }
    }

    /// The tenant's profile, or a neutral placeholder when the tenant never configured one.
    pub async fn tenant_profile(&self) -> Result<TenantProfile, HandlerError> {
        let profile = self.services().tenants.find_profile(self.tenant_id()).await?;
        Ok(profile.unwrap_or_else(|| TenantProfile::placeholder(self.tenant_id().clone())))
    }
}

/// Converts a model-supplied quantity into a positive count.
pub(crate) fn positive_quantity(quantity: i64) -> Result<u32, HandlerError> {
    if quantity < 1 {
        return Err(HandlerError::Validation(
            "The quantity must be at least 1.".to_string(),
        ));
    }
    u32::try_from(quantity)
        .map_err(|_| HandlerError::Validation(format!("{quantity} is more than I can add at once.")))
}


#[cfg(test)]
mod tests {
    use storefront_db::DemoSeedDataset;

    use super::fixture::Harness;
    use super::{positive_quantity, HandlerError};
    use crate::tools::ErrorKind;

    #[test]
    fn quantities_below_one_are_validation_errors() {
        assert_eq!(positive_quantity(2).expect("valid"), 2);
        let error = positive_quantity(0).expect_err("zero");
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(positive_quantity(-3).is_err());
    }

    #[test]
    fn storage_failures_hide_their_details() {
        let error = HandlerError::Repository(
            storefront_db::repositories::RepositoryError::Decode("bad column".to_string()),
        );
        assert_eq!(error.kind(), ErrorKind::Persistence);
        assert!(!error.user_message().contains("bad column"));
    }

    #[tokio::test]
    async fn first_list_replaces_and_later_lists_extend() {
        let harness = Harness::demo().await;
        let products = DemoSeedDataset::products();
        harness.dispatcher.sessions().store_product_list(&harness.key, &products[..3]).await;

        let mut context = harness.context().await;
        assert!(context.remember_products(&[]).await.is_empty());
        let first = context.remember_products(&products[3..5]).await;
        let second = context.remember_products(&products[5..6]).await;

        assert_eq!(first.iter().map(|r| r.sequential_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(second[0].sequential_id, 3);
        assert_eq!(harness.dispatcher.sessions().product_list(&harness.key).await.len(), 3);
    }

    #[tokio::test]
    async fn tenant_profile_comes_from_the_repository() {
        let harness = Harness::demo().await;
        let context = harness.context().await;
        assert_eq!(context.tenant_profile().await.expect("profile").store_name, "Farmácia Demo");
    }
}
