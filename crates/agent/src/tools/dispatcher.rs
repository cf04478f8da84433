//! Runs the tool invocations of one turn and reconciles their results.

use std::sync::Arc;

use tracing::{info, warn};

use storefront_core::domain::session::SessionKey;
use storefront_db::repositories::{
    AddressRepository, CartRepository, CustomerRepository, InMemoryCommerceRepository,
    InMemoryTenantRepository, OrderRepository, SqlAddressRepository, SqlCartRepository,
    SqlCustomerRepository, SqlOrderRepository, SqlTenantRepository, TenantRepository,
};
use storefront_db::DbPool;

use super::classify::filter_cart_actions;
use super::command::{DecodeError, ToolCommand};
use super::handlers::{cart, catalog, customer, orders, store, HandlerResult, ToolContext};
use super::{ErrorKind, ToolInvocation, ToolOutcome};
use crate::aggregator::{self, AggregatedReply};
use crate::alerts::AlertNotifier;
use crate::retrieval::RetrievalPipeline;
use crate::session::SessionStore;

const DEFAULT_RESULT_LIMIT: usize = 10;
const UNKNOWN_TOOL_REPLY: &str = "I can't help with that here yet.";
const UNREADABLE_ARGUMENTS_REPLY: &str =
    "I didn't understand the details of that request. Could you rephrase it?";

/// Domain services the handlers call, one repository per concern.
#[derive(Clone)]
pub struct CommerceServices {
    pub customers: Arc<dyn CustomerRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub addresses: Arc<dyn AddressRepository>,
    pub tenants: Arc<dyn TenantRepository>,
}

impl CommerceServices {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            customers: Arc::new(SqlCustomerRepository::new(pool.clone())),
            carts: Arc::new(SqlCartRepository::new(pool.clone())),
            orders: Arc::new(SqlOrderRepository::new(pool.clone())),
            addresses: Arc::new(SqlAddressRepository::new(pool.clone())),
            tenants: Arc::new(SqlTenantRepository::new(pool)),
        }
    }

    pub fn in_memory(
        commerce: Arc<InMemoryCommerceRepository>,
        tenants: Arc<InMemoryTenantRepository>,
    ) -> Self {
        Self {
            customers: commerce.clone(),
            carts: commerce.clone(),
            orders: commerce.clone(),
            addresses: commerce,
            tenants,
        }
    }
}

/// What a batch of invocations produced: the text for the customer and every outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchReport {
    pub reply: String,
    pub outcomes: Vec<ToolOutcome>,
}

pub struct ToolDispatcher {
    sessions: Arc<SessionStore>,
    services: CommerceServices,
    retrieval: Arc<RetrievalPipeline>,
    alerts: Arc<dyn AlertNotifier>,
    default_limit: usize,
}

impl ToolDispatcher {
    pub fn new(
        sessions: Arc<SessionStore>,
        services: CommerceServices,
        retrieval: Arc<RetrievalPipeline>,
        alerts: Arc<dyn AlertNotifier>,
    ) -> Self {
        Self { sessions, services, retrieval, alerts, default_limit: DEFAULT_RESULT_LIMIT }
    }

    /// Result cap for searches that don't ask for one. `0` lifts the cap.
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn services(&self) -> &CommerceServices {
        &self.services
    }

    pub fn retrieval(&self) -> &RetrievalPipeline {
        &self.retrieval
    }

    pub fn alerts(&self) -> Arc<dyn AlertNotifier> {
        self.alerts.clone()
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Runs every invocation in order. A failing invocation becomes a failed outcome and the
    /// rest of the batch still runs.
    pub async fn execute(
        &self,
        key: &SessionKey,
        message: &str,
        invocations: Vec<ToolInvocation>,
    ) -> DispatchReport {
        let customer =
            match self.services.customers.get_or_create(&key.tenant_id, &key.identity).await {
                Ok(customer) => customer,
                Err(error) => {
                    warn!(
                        event_name = "tool.customer.unavailable",
                        tenant_id = %key.tenant_id,
                        identity = %key.masked_identity(),
                        error = %error,
                        "customer record could not be loaded; skipping tool batch"
                    );
                    let outcomes: Vec<ToolOutcome> = invocations
                        .iter()
                        .map(|invocation| {
                            ToolOutcome::failed(invocation, ErrorKind::Persistence, error.to_string())
                        })
                        .collect();
                    let AggregatedReply { text, .. } = aggregator::combine(&outcomes);
                    return DispatchReport { reply: text, outcomes };
                }
            };

        let proposed = invocations.len();
        let invocations = filter_cart_actions(message, invocations);
        if invocations.len() < proposed {
            info!(
                event_name = "tool.cart_actions.filtered",
                tenant_id = %key.tenant_id,
                proposed,
                kept = invocations.len(),
                "dropped redundant cart actions for a single-item request"
            );
        }

        let shown = self.sessions.product_list(key).await;
        let mut cx = ToolContext::new(self, key, customer, shown);
        let mut outcomes = Vec::with_capacity(invocations.len());
        for invocation in &invocations {
            outcomes.push(self.run_one(&mut cx, invocation).await);
        }

        let aggregated = aggregator::combine(&outcomes);
        if let Some(first) = aggregated.renumbered_from {
            self.sessions.renumber_product_list(key, first).await;
        }
        info!(
            event_name = "tool.batch.completed",
            tenant_id = %key.tenant_id,
            identity = %key.masked_identity(),
            invocations = outcomes.len(),
            failed = outcomes.iter().filter(|outcome| !outcome.is_success()).count(),
            "tool batch completed"
        );
        DispatchReport { reply: aggregated.text, outcomes }
    }

    async fn run_one(&self, cx: &mut ToolContext<'_>, invocation: &ToolInvocation) -> ToolOutcome {
        let command = match ToolCommand::decode(&invocation.name, &invocation.arguments) {
            Ok(command) => command,
            Err(error) => {
                let (kind, reply) = match error {
                    DecodeError::UnknownTool(_) => (ErrorKind::UnknownTool, UNKNOWN_TOOL_REPLY),
                    DecodeError::InvalidArguments { .. } => {
                        (ErrorKind::Parse, UNREADABLE_ARGUMENTS_REPLY)
                    }
                };
                warn!(
                    event_name = "tool.invocation.failed",
                    tenant_id = %cx.tenant_id(),
                    tool_name = %invocation.name,
                    error_kind = kind.as_str(),
                    error = %error,
                    "tool invocation could not be decoded"
                );
                return ToolOutcome::failed(invocation, kind, reply);
            }
        };

        match run_command(cx, command).await {
            Ok(reply) => ToolOutcome::succeeded(invocation, reply),
            Err(error) => {
                let kind = error.kind();
                if kind.is_recoverable() {
                    info!(
                        event_name = "tool.invocation.declined",
                        tenant_id = %cx.tenant_id(),
                        tool_name = %invocation.name,
                        error_kind = kind.as_str(),
                        "tool answered with an explanation"
                    );
                } else {
                    warn!(
                        event_name = "tool.invocation.failed",
                        tenant_id = %cx.tenant_id(),
                        tool_name = %invocation.name,
                        error_kind = kind.as_str(),
                        error = %error,
                        "tool invocation failed"
                    );
                }
                ToolOutcome::failed(invocation, kind, error.user_message())
            }
        }
    }
}

async fn run_command(cx: &mut ToolContext<'_>, command: ToolCommand) -> HandlerResult {
    match command {
        ToolCommand::SearchProducts(args) => catalog::search_products(cx, args).await,
        ToolCommand::SearchMultipleProducts(args) => {
            catalog::search_multiple_products(cx, args).await
        }
        ToolCommand::ProductDetails(args) => catalog::product_details(cx, args).await,
        ToolCommand::AddToCart(args) => cart::add_to_cart(cx, args).await,
        ToolCommand::AddProductByName(args) => cart::add_product_by_name(cx, args).await,
        ToolCommand::RemoveFromCart(args) => cart::remove_from_cart(cx, args).await,
        ToolCommand::UpdateCartQuantity(args) => cart::update_cart_quantity(cx, args).await,
        ToolCommand::ViewCart => cart::view_cart(cx).await,
        ToolCommand::ClearCart => cart::clear_cart(cx).await,
        ToolCommand::Checkout => orders::checkout(cx).await,
        ToolCommand::ConfirmOrder => orders::confirm_order(cx).await,
        ToolCommand::CancelOrder(args) => orders::cancel_order(cx, args).await,
        ToolCommand::OrderHistory => orders::order_history(cx).await,
        ToolCommand::UpdateProfile(args) => customer::update_profile(cx, args).await,
        ToolCommand::ListAddresses => customer::list_addresses(cx).await,
        ToolCommand::RegisterAddress(args) => customer::register_address(cx, args).await,
        ToolCommand::CheckDelivery(args) => store::check_delivery(cx, args).await,
        ToolCommand::StoreLocation => store::store_location(cx).await,
        ToolCommand::RequestHuman(args) => store::request_human(cx, args).await,
    }
}
