use rust_decimal::Decimal;
use tracing::info;

use storefront_core::catalog::money::format_money;
use storefront_core::domain::commerce::{cart_total, Address, CartItem, Order, OrderId};
use storefront_core::domain::session::{OrderListEntry, ScratchValue};
use storefront_core::domain::tenant::{DeliveryCoverage, TenantProfile};
use storefront_core::errors::DomainError;

use super::cart::{empty_cart_message, render_cart};
use super::{HandlerError, HandlerResult, ToolContext};
use crate::alerts::{spawn_alert, Alert};
use crate::tools::classify::{looks_like_order_number, parse_sequence_number};
use crate::tools::command::OrderRefArgs;
use crate::tools::reply::ToolReply;

/// Scratch entry holding the numbered list shown by `order_history`.
pub(crate) const ORDERS_LIST: &str = "orders_list";

const HISTORY_LIMIT: usize = 10;

pub async fn checkout(cx: &mut ToolContext<'_>) -> HandlerResult {
    let items = cx.services().carts.items(&cx.customer.id).await?;
    if items.is_empty() {
        return Ok(ToolReply::message(empty_cart_message()));
    }

    let mut text = render_cart(&items);
    if !cx.customer.has_name() {
        text.push_str("\n\nTo finish, what name should I put on the order?");
        return Ok(ToolReply::Message(text));
    }

    let Some(address) = default_address(cx).await? else {
        text.push_str(
            "\n\nWhere should we deliver? Send the street, number, neighborhood, city, state \
             and zip code.",
        );
        return Ok(ToolReply::Message(text));
    };

    let profile = cx.tenant_profile().await?;
    match delivery_fee(&profile, &address) {
        Some(fee) => {
            text.push_str(&format!(
                "\n\nDeliver to: {}\nDelivery fee: {}\nOrder total: {}\n\nShall I place the \
                 order? Reply 'confirm' to finish, or send another address.",
                address.display(),
                format_money(fee),
                format_money(cart_total(&items) + fee)
            ));
        }
        None => {
            text.push_str(&format!(
                "\n\nSorry, we don't deliver to {} yet. Send another address to continue.",
                address.city
            ));
        }
    }
    Ok(ToolReply::Message(text))
}

pub async fn confirm_order(cx: &mut ToolContext<'_>) -> HandlerResult {
    let items = cx.services().carts.items(&cx.customer.id).await?;
    if items.is_empty() {
        return Err(DomainError::EmptyCart.into());
    }
    if !cx.customer.has_name() {
        return Err(HandlerError::Validation(
            "Before placing the order, tell me the name for the delivery.".to_string(),
        ));
    }
    let address = default_address(cx).await?.ok_or_else(|| {
        HandlerError::Validation(
            "I still need a delivery address: street, number, neighborhood, city and state."
                .to_string(),
        )
    })?;
    if !address.is_complete() {
        return Err(HandlerError::Validation(
            "Your delivery address is incomplete. Please send it again.".to_string(),
        ));
    }

    let profile = cx.tenant_profile().await?;
    let fee = delivery_fee(&profile, &address).ok_or_else(|| {
        HandlerError::Conflict(format!(
            "Sorry, we don't deliver to {} yet. Send another address to continue.",
            address.city
        ))
    })?;
    check_stock(cx, &items).await?;

    // Stock is checked again inside the order transaction; another customer may have
    // taken the last units since the check above.
    let order = cx
        .services()
        .orders
        .create_from_cart(cx.tenant_id(), &cx.customer.id, &address, fee)
        .await?;

    cx.sessions().clear(cx.key()).await;
    info!(
        event_name = "order.placed",
        tenant_id = %cx.tenant_id(),
        order_number = %order.number,
        identity = %cx.key().masked_identity(),
        "order created from cart"
    );
    spawn_alert(
        cx.alerts(),
        Alert::OrderPlaced {
            tenant_id: cx.tenant_id().0.clone(),
            identity: cx.key().identity.clone(),
            order_number: order.number.clone(),
            total: order.total,
            items: order.items.len(),
        },
    );

    Ok(ToolReply::Message(format!(
        "Order {} placed!\n\nItems: {}\nDelivery fee: {}\nTotal: {}\nDelivery to: {}\n\n\
         We'll let you know when it is on the way.",
        order.number,
        format_money(order.total - order.delivery_fee),
        format_money(order.delivery_fee),
        format_money(order.total),
        order.delivery_address.display()
    )))
}

pub async fn cancel_order(cx: &mut ToolContext<'_>, args: OrderRefArgs) -> HandlerResult {
    let identifier = args.identifier.trim();
    let orders = &cx.services().orders;

    let order = if looks_like_order_number(identifier) {
        orders.find_by_number(cx.tenant_id(), identifier).await?
    } else if let Some(sequence) = parse_sequence_number(identifier) {
        let order_id = listed_order(cx, sequence).await?;
        orders.find_by_id(&order_id).await?
    } else {
        return Err(HandlerError::Validation(
            "Tell me the order number (like ORD-1A2B3C4D) or its number in your order history."
                .to_string(),
        ));
    };

    let order = order
        .filter(|order| order.customer_id == cx.customer.id)
        .ok_or_else(|| HandlerError::NotFound(format!("I couldn't find order {identifier}.")))?;
    if !order.status.can_cancel() {
        return Err(DomainError::NotCancellable {
            order_number: order.number,
            status: order.status.label().to_lowercase(),
        }
        .into());
    }

    let cancelled = orders.cancel(&order.id).await?;
    Ok(ToolReply::message(format!("Order {} was cancelled.", cancelled.number)))
}

pub async fn order_history(cx: &mut ToolContext<'_>) -> HandlerResult {
    let orders = cx.services().orders.list_for_customer(&cx.customer.id, HISTORY_LIMIT).await?;
    if orders.is_empty() {
        return Ok(ToolReply::message("You have no orders yet."));
    }

    let entries: Vec<OrderListEntry> = orders
        .iter()
        .zip(1u32..)
        .map(|(order, sequence)| OrderListEntry {
            sequence,
            order_id: order.id.clone(),
            number: order.number.clone(),
        })
        .collect();
    cx.sessions().put_scratch(cx.key(), ORDERS_LIST, ScratchValue::OrderList(entries)).await;

    let mut text = "Your recent orders:\n\n".to_string();
    for (order, sequence) in orders.iter().zip(1u32..) {
        text.push_str(&history_line(sequence, order));
        text.push('\n');
    }
    if orders.iter().any(|order| order.status.can_cancel()) {
        text.push_str("\nTo cancel a pending order, tell me its number.");
    }
    Ok(ToolReply::Message(text.trim_end().to_string()))
}

fn history_line(sequence: u32, order: &Order) -> String {
    format!(
        "{sequence}. {} - {} - {} ({})",
        order.number,
        order.status.label(),
        format_money(order.total),
        order.created_at.format("%d/%m/%Y")
    )
}

async fn listed_order(cx: &ToolContext<'_>, sequence: u32) -> Result<OrderId, HandlerError> {
    match cx.sessions().scratch(cx.key(), ORDERS_LIST).await {
        Some(ScratchValue::OrderList(entries)) => entries
            .into_iter()
            .find(|entry| entry.sequence == sequence)
            .map(|entry| entry.order_id)
            .ok_or_else(|| {
                HandlerError::NotFound(format!("There is no order {sequence} in your history."))
            }),
        _ => Err(HandlerError::NotFound(
            "Ask for your order history first, then tell me which one to cancel.".to_string(),
        )),
    }
}

async fn default_address(cx: &ToolContext<'_>) -> Result<Option<Address>, HandlerError> {
    let addresses = cx.services().addresses.list(&cx.customer.id).await?;
    Ok(addresses.into_iter().find(|address| address.is_default))
}

/// The fee for delivering to `address`, or `None` when the store doesn't serve it.
/// A store without configured zones delivers anywhere.
fn delivery_fee(profile: &TenantProfile, address: &Address) -> Option<Decimal> {
    match profile.coverage(&address.city, Some(&address.neighborhood)) {
        DeliveryCoverage::Served { fee } => Some(fee),
        DeliveryCoverage::NotConfigured => Some(profile.delivery_fee),
        DeliveryCoverage::NotServed => None,
    }
}

async fn check_stock(cx: &ToolContext<'_>, items: &[CartItem]) -> Result<(), HandlerError> {
    let catalog = cx.retrieval().catalog();
    for item in items {
        let product = catalog.find_by_id(cx.tenant_id(), &item.product_id).await?;
        match product {
            Some(product) if product.has_stock_for(item.quantity) => {}
            Some(product) => {
                return Err(DomainError::InsufficientStock {
                    product: product.name,
                    requested: item.quantity,
                    available: product.stock_quantity,
                }
                .into())
            }
            None => {
                return Err(DomainError::ProductUnavailable { product: item.name.clone() }.into())
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use storefront_core::domain::commerce::{NewAddress, OrderStatus};
    use storefront_core::domain::product::ProductId;
    use storefront_core::domain::session::ScratchValue;
    use storefront_core::errors::DomainError;
    use storefront_db::repositories::{
        AddressRepository, CartRepository, CatalogRepository, CustomerRepository, OrderRepository,
    };

    use super::{cancel_order, checkout, confirm_order, order_history, ORDERS_LIST};
    use crate::tools::command::{AddToCartArgs, OrderRefArgs};
    use crate::tools::handlers::cart::add_to_cart;
    use crate::tools::handlers::fixture::Harness;
    use crate::tools::handlers::HandlerError;
    use crate::tools::reply::ToolReply;

    fn address(city: &str, neighborhood: &str) -> NewAddress {
        NewAddress {
            street: "Rua das Acácias".to_string(),
            number: "45".to_string(),
            neighborhood: neighborhood.to_string(),
            city: city.to_string(),
            state: "DF".to_string(),
            zip_code: "70000000".to_string(),
            complement: None,
        }
    }

    async fn ready_customer(harness: &Harness, city: &str) {
        let customer = harness.customer().await;
        harness
            .commerce
            .update_profile(&customer.id, Some("Ana".to_string()), None)
            .await
            .expect("name");
        harness
            .commerce
            .add(&customer.id, address(city, "Asa Norte"), true)
            .await
            .expect("address");
    }

    fn text(reply: ToolReply) -> String {
        match reply {
            ToolReply::Message(text) => text,
            other => other.render(),
        }
    }

    #[tokio::test]
    async fn checkout_asks_for_what_is_missing() {
        let harness = Harness::demo().await;
        let mut cx = harness.context().await;
        assert!(text(checkout(&mut cx).await.expect("empty")).starts_with("Your cart is empty"));

        add_to_cart(&mut cx, AddToCartArgs { identifier: "demo-soro-500".to_string(), quantity: 2 })
            .await
            .expect("add");
        assert!(text(checkout(&mut cx).await.expect("no name")).contains("what name"));

        ready_customer(&harness, "Brasília").await;
        let mut cx = harness.context().await;
        let summary = text(checkout(&mut cx).await.expect("summary"));
        assert!(summary.contains("Delivery fee: R$ 7,00"));
        assert!(summary.contains("Order total: R$ 20,80"));
    }

    #[tokio::test]
    async fn confirm_places_order_and_clears_session() {
        let harness = Harness::demo().await;
        ready_customer(&harness, "Brasília").await;
        let mut cx = harness.context().await;
        add_to_cart(&mut cx, AddToCartArgs { identifier: "demo-soro-500".to_string(), quantity: 1 })
            .await
            .expect("add");

        let placed = text(confirm_order(&mut cx).await.expect("order"));
        assert!(placed.starts_with("Order ORD-"));
        assert!(placed.contains("Items: R$ 6,90"), "{placed}");
        assert!(placed.contains("Total: R$ 13,90"));
        assert!(!harness.dispatcher.sessions().contains(&harness.key).await);

        let customer = harness.customer().await;
        assert!(harness.commerce.items(&customer.id).await.expect("cart").is_empty());
        let orders = harness.commerce.list_for_customer(&customer.id, 10).await.expect("orders");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Pending);
        assert_eq!(orders[0].total, Decimal::new(1390, 2), "stored total includes delivery");
    }

    #[tokio::test]
    async fn confirm_reports_units_sold_to_someone_else_first() {
        let harness = Harness::demo().await;
        ready_customer(&harness, "Brasília").await;
        let xarope_id = ProductId("demo-xarope-tosse".to_string());
        let xarope = harness
            .catalog
            .find_by_id(&harness.key.tenant_id, &xarope_id)
            .await
            .expect("find")
            .expect("xarope");
        let mut cx = harness.context().await;
        add_to_cart(
            &mut cx,
            AddToCartArgs { identifier: xarope_id.0.clone(), quantity: i64::from(xarope.stock_quantity) },
        )
        .await
        .expect("every unit");

        let other = harness
            .commerce
            .get_or_create(&harness.key.tenant_id, "5561888880000")
            .await
            .expect("other customer");
        let other_address =
            harness.commerce.add(&other.id, address("Brasília", "Asa Sul"), true).await.expect("address");
        harness.commerce.add_item(&other.id, &xarope, 1).await.expect("cart");
        harness
            .commerce
            .create_from_cart(&harness.key.tenant_id, &other.id, &other_address, Decimal::ZERO)
            .await
            .expect("other order");

        let error = confirm_order(&mut cx).await.expect_err("one unit short");
        assert!(matches!(
            error,
            HandlerError::Domain(DomainError::InsufficientStock { ref product, .. }) if product == &xarope.name
        ));
        assert!(error.user_message().starts_with("Sorry, only"));
        let customer = harness.customer().await;
        assert_eq!(harness.commerce.items(&customer.id).await.expect("cart").len(), 1);
        assert!(harness.commerce.list_for_customer(&customer.id, 10).await.expect("orders").is_empty());
    }

    #[tokio::test]
    async fn confirm_refuses_unserved_city() {
        let harness = Harness::demo().await;
        ready_customer(&harness, "Goiânia").await;
        let mut cx = harness.context().await;
        add_to_cart(&mut cx, AddToCartArgs { identifier: "demo-soro-500".to_string(), quantity: 1 })
            .await
            .expect("add");

        let error = confirm_order(&mut cx).await.expect_err("not served");
        assert!(matches!(error, HandlerError::Conflict(ref message) if message.contains("Goiânia")));
        let customer = harness.customer().await;
        assert_eq!(harness.commerce.items(&customer.id).await.expect("cart").len(), 1);
    }

    #[tokio::test]
    async fn history_numbers_feed_cancellation() {
        let harness = Harness::demo().await;
        ready_customer(&harness, "Brasília").await;
        let mut cx = harness.context().await;
        add_to_cart(&mut cx, AddToCartArgs { identifier: "demo-dorflex".to_string(), quantity: 1 })
            .await
            .expect("add");
        confirm_order(&mut cx).await.expect("order");

        let error = cancel_order(&mut cx, OrderRefArgs { identifier: "1".to_string() })
            .await
            .expect_err("no history yet");
        assert!(matches!(error, HandlerError::NotFound(_)));

        let history = text(order_history(&mut cx).await.expect("history"));
        assert!(history.contains("1. ORD-"));
        assert!(matches!(
            harness.dispatcher.sessions().scratch(&harness.key, ORDERS_LIST).await,
            Some(ScratchValue::OrderList(ref entries)) if entries.len() == 1
        ));

        let cancelled = text(
            cancel_order(&mut cx, OrderRefArgs { identifier: "1".to_string() })
                .await
                .expect("cancel"),
        );
        assert!(cancelled.ends_with("was cancelled."));

        let again = cancel_order(&mut cx, OrderRefArgs { identifier: "1".to_string() })
            .await
            .expect_err("already cancelled");
        assert!(matches!(again, HandlerError::Domain(DomainError::NotCancellable { .. })));
    }

    #[tokio::test]
    async fn orders_of_other_customers_are_invisible() {
        let harness = Harness::demo().await;
        let other = harness
            .commerce
            .get_or_create(&harness.key.tenant_id, "5561888880000")
            .await
            .expect("other customer");
        harness
            .commerce
            .add(&other.id, address("Brasília", "Asa Sul"), true)
            .await
            .expect("address");
        let product = storefront_db::DemoSeedDataset::products().remove(0);
        harness.commerce.add_item(&other.id, &product, 1).await.expect("cart");
        let addresses = harness.commerce.list(&other.id).await.expect("addresses");
        let order = harness
            .commerce
            .create_from_cart(&harness.key.tenant_id, &other.id, &addresses[0], Decimal::ZERO)
            .await
            .expect("order");

        let mut cx = harness.context().await;
        let error = cancel_order(&mut cx, OrderRefArgs { identifier: order.number.clone() })
            .await
            .expect_err("someone else's order");
        assert!(matches!(error, HandlerError::NotFound(_)));
    }
}
