use storefront_core::catalog::filters::SearchFilters;
use storefront_core::catalog::money::format_money;
use storefront_core::domain::commerce::{cart_total, CartItem};
use storefront_core::domain::product::{CatalogProduct, ProductId};
use storefront_core::errors::DomainError;

use super::catalog::no_longer_available;
use super::{positive_quantity, HandlerError, HandlerResult, ToolContext, LIST_EXPIRED};
use crate::tools::classify::parse_sequence_number;
use crate::tools::command::{AddByNameArgs, AddToCartArgs, CartLineArgs, CartQuantityArgs};
use crate::tools::reply::{CartAddition, ProductListing, ToolReply};

const EMPTY_CART: &str = "Your cart is empty. Send 'products' to see the catalog.";

/// Outcome of looking a product up by its name.
enum NameMatch {
    Single(CatalogProduct),
    Several(Vec<CatalogProduct>),
    Nothing,
}

pub async fn add_to_cart(cx: &mut ToolContext<'_>, args: AddToCartArgs) -> HandlerResult {
    let quantity = positive_quantity(args.quantity)?;
    let identifier = args.identifier.trim();
    if identifier.is_empty() {
        return Err(HandlerError::Validation("Which product should I add?".to_string()));
    }

    let product = resolve_for_cart(cx, identifier).await?;
    add_product(cx, &product, quantity).await
}

pub async fn add_product_by_name(cx: &mut ToolContext<'_>, args: AddByNameArgs) -> HandlerResult {
    let quantity = positive_quantity(args.quantity)?;
    let name = args.name.trim().to_string();
    if name.is_empty() {
        return Err(HandlerError::Validation("Which product should I add?".to_string()));
    }

    match search_by_name(cx, &name).await? {
        NameMatch::Single(product) => add_product(cx, &product, quantity).await,
        NameMatch::Several(products) => {
            let items = cx.remember_products(&products).await;
            Ok(ToolReply::FoundNotAdded(ProductListing { query: name, items }))
        }
        NameMatch::Nothing => Err(HandlerError::NotFound(format!(
            "I couldn't find \"{name}\". Try another name or send 'products' to see the catalog."
        ))),
    }
}

pub async fn remove_from_cart(cx: &mut ToolContext<'_>, args: CartLineArgs) -> HandlerResult {
    let carts = &cx.services().carts;
    let items = carts.items(&cx.customer.id).await?;
    let line = cart_line(&items, args.item_number)?;
    carts.remove_item(&cx.customer.id, &line.id).await?;

    let remaining = carts.items(&cx.customer.id).await?;
    if remaining.is_empty() {
        return Ok(ToolReply::message(format!(
            "Removed {} from your cart. Your cart is now empty.",
            line.name
        )));
    }
    Ok(ToolReply::message(format!(
        "Removed {} from your cart.\nCart total: {}",
        line.name,
        format_money(cart_total(&remaining))
    )))
}

pub async fn update_cart_quantity(
    cx: &mut ToolContext<'_>,
    args: CartQuantityArgs,
) -> HandlerResult {
    let quantity = positive_quantity(args.quantity)?;
    let carts = &cx.services().carts;
    let items = carts.items(&cx.customer.id).await?;
    let line = cart_line(&items, args.item_number)?;

    let product = cx.retrieval().catalog().find_by_id(cx.tenant_id(), &line.product_id).await?;
    if let Some(product) = product {
        if !product.has_stock_for(quantity) {
            return Err(insufficient_stock(&product, quantity, product.stock_quantity));
        }
    }

    let updated = carts.update_quantity(&cx.customer.id, &line.id, quantity).await?;
    let items = carts.items(&cx.customer.id).await?;
    Ok(ToolReply::message(format!(
        "Updated {} to {} units.\nCart total: {}",
        updated.name,
        updated.quantity,
        format_money(cart_total(&items))
    )))
}

pub async fn view_cart(cx: &mut ToolContext<'_>) -> HandlerResult {
    let items = cx.services().carts.items(&cx.customer.id).await?;
    if items.is_empty() {
        return Ok(ToolReply::message(EMPTY_CART));
    }
    Ok(ToolReply::Message(render_cart(&items)))
}

pub async fn clear_cart(cx: &mut ToolContext<'_>) -> HandlerResult {
    cx.services().carts.clear(&cx.customer.id).await?;
    Ok(ToolReply::message("Done, your cart is now empty."))
}

/// `Your cart:` followed by numbered lines and the total.
pub(crate) fn render_cart(items: &[CartItem]) -> String {
    let mut text = "Your cart:\n\n".to_string();
    for (index, item) in items.iter().enumerate() {
        text.push_str(&format!(
            "{}. {}x {} - {}\n",
            index + 1,
            item.quantity,
            item.name,
            format_money(item.line_total())
        ));
    }
    text.push_str(&format!("\nTotal: {}", format_money(cart_total(items))));
    text
}

pub(crate) const fn empty_cart_message() -> &'static str {
    EMPTY_CART
}

/// Session number, then catalog id, then an unambiguous name match.
async fn resolve_for_cart(
    cx: &ToolContext<'_>,
    identifier: &str,
) -> Result<CatalogProduct, HandlerError> {
    let catalog = cx.retrieval().catalog();

    if let Some(sequence) = parse_sequence_number(identifier) {
        let Some(reference) = cx.shown_by_sequence(sequence).cloned() else {
            if cx.shown().is_empty() {
                return Err(HandlerError::NotFound(LIST_EXPIRED.to_string()));
            }
            return Err(HandlerError::NotFound(format!(
                "There is no item {sequence} in the last list."
            )));
        };
        return catalog
            .find_by_id(cx.tenant_id(), &reference.product_id)
            .await?
            .ok_or_else(|| no_longer_available(&reference));
    }

    let id = ProductId(identifier.to_string());
    if let Some(product) = catalog.find_by_id(cx.tenant_id(), &id).await? {
        return Ok(product);
    }

    match search_by_name(cx, identifier).await? {
        NameMatch::Single(product) => Ok(product),
        NameMatch::Several(_) | NameMatch::Nothing => Err(HandlerError::NotFound(format!(
            "I couldn't identify \"{identifier}\". Search for it first and reply with the item \
             number, or send 'products' to see the catalog."
        ))),
    }
}

async fn search_by_name(cx: &ToolContext<'_>, name: &str) -> Result<NameMatch, HandlerError> {
    let filters = SearchFilters::query(name).with_limit(cx.default_limit());
    let mut products = cx.retrieval().search(cx.tenant_id(), &filters).await?.products;

    if products.len() == 1 {
        return Ok(NameMatch::Single(products.remove(0)));
    }
    let wanted = name.trim().to_lowercase();
    if let Some(position) =
        products.iter().position(|product| product.name.trim().to_lowercase() == wanted)
    {
        return Ok(NameMatch::Single(products.remove(position)));
    }
    if products.is_empty() {
        Ok(NameMatch::Nothing)
    } else {
        Ok(NameMatch::Several(products))
    }
}

/// Adds after checking stock against what the cart already holds of the same product.
async fn add_product(
    cx: &ToolContext<'_>,
    product: &CatalogProduct,
    quantity: u32,
) -> HandlerResult {
    let carts = &cx.services().carts;
    let items = carts.items(&cx.customer.id).await?;
    let in_cart: u32 = items
        .iter()
        .filter(|item| item.product_id == product.id)
        .map(|item| item.quantity)
        .sum();
    let available = product.stock_quantity.saturating_sub(in_cart);
    if quantity > available {
        return Err(insufficient_stock(product, quantity, available));
    }

    carts.add_item(&cx.customer.id, product, quantity).await?;
    let items = carts.items(&cx.customer.id).await?;
    Ok(ToolReply::AddedToCart(CartAddition {
        product_name: product.name.clone(),
        quantity,
        unit_price: product.effective_price(),
        cart_total: cart_total(&items),
    }))
}

fn insufficient_stock(product: &CatalogProduct, requested: u32, available: u32) -> HandlerError {
    DomainError::InsufficientStock { product: product.name.clone(), requested, available }.into()
}

fn cart_line(items: &[CartItem], item_number: i64) -> Result<CartItem, HandlerError> {
    if items.is_empty() {
        return Err(HandlerError::NotFound(EMPTY_CART.to_string()));
    }
    usize::try_from(item_number)
        .ok()
        .and_then(|number| number.checked_sub(1))
        .and_then(|index| items.get(index))
        .cloned()
        .ok_or_else(|| {
            HandlerError::NotFound(format!(
                "Your cart has no item {item_number}; it has {} items.",
                items.len()
            ))
        })
}
