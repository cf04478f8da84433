use std::collections::BTreeMap;

use rust_decimal::Decimal;

use storefront_core::catalog::filters::{fold_case, SearchFilters, SortKey};
use storefront_core::catalog::money::format_money;
use storefront_core::domain::product::CatalogProduct;
use storefront_core::domain::session::ProductReference;

use super::{HandlerError, HandlerResult, ToolContext, LIST_EXPIRED};
use crate::tools::classify::{is_generic_catalog_query, parse_sequence_number};
use crate::tools::command::{MultiSearchArgs, ProductRefArgs, SearchArgs};
use crate::tools::reply::{CatalogSection, NoMatches, ProductListing, ToolReply};

/// Above this many products a full listing is refused in favour of a search.
const FULL_CATALOG_MAX: usize = 100;
const UNCATEGORIZED: &str = "Other products";

pub async fn search_products(cx: &mut ToolContext<'_>, args: SearchArgs) -> HandlerResult {
    let filters = search_filters(cx, args)?;
    let result = cx.retrieval().search(cx.tenant_id(), &filters).await?;
    if is_full_catalog(&filters) {
        return full_catalog(cx, result.products).await;
    }
    if result.is_empty() && filters.has_query() {
        let suggestions = cx.retrieval().suggestions(cx.tenant_id(), &filters.query).await;
        let listing = ProductListing { query: filters.query, items: Vec::new() };
        return Ok(ToolReply::NoMatches(NoMatches { listing, suggestions }));
    }
    let items = cx.remember_products(&result.products).await;
    Ok(ToolReply::ProductList(ProductListing { query: filters.query, items }))
}

/// No query and no narrowing filter: the customer asked for the catalog as a whole.
fn is_full_catalog(filters: &SearchFilters) -> bool {
    !filters.has_query()
        && filters.brand.is_none()
        && filters.tags.is_none()
        && filters.min_price.is_none()
        && filters.max_price.is_none()
}

async fn full_catalog(cx: &mut ToolContext<'_>, products: Vec<CatalogProduct>) -> HandlerResult {
    if products.len() > FULL_CATALOG_MAX {
        return Ok(ToolReply::message(
            "Our catalog is too large to show in full. Tell me which product or category you \
             are looking for.",
        ));
    }

    let groups = group_by_category(products);
    let ordered: Vec<CatalogProduct> =
        groups.iter().flat_map(|(_, products)| products.iter().cloned()).collect();
    let mut items = cx.remember_products(&ordered).await.into_iter();
    let sections = groups
        .into_iter()
        .map(|(category, products)| CatalogSection {
            category,
            items: items.by_ref().take(products.len()).collect(),
        })
        .collect();
    Ok(ToolReply::Catalog(sections))
}

/// Categories in alphabetical order with products by name inside each; products without a
/// category come last.
fn group_by_category(products: Vec<CatalogProduct>) -> Vec<(String, Vec<CatalogProduct>)> {
    let mut named: BTreeMap<String, (String, Vec<CatalogProduct>)> = BTreeMap::new();
    let mut uncategorized = Vec::new();
    for product in products {
        match product.category.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
            Some(category) => named
                .entry(fold_case(category))
                .or_insert_with(|| (category.to_string(), Vec::new()))
                .1
                .push(product),
            None => uncategorized.push(product),
        }
    }

    let mut groups: Vec<(String, Vec<CatalogProduct>)> = named.into_values().collect();
    if !uncategorized.is_empty() {
        groups.push((UNCATEGORIZED.to_string(), uncategorized));
    }
    for (_, products) in &mut groups {
        products.sort_by(|a, b| fold_case(&a.name).cmp(&fold_case(&b.name)));
    }
    groups
}

pub async fn search_multiple_products(
    cx: &mut ToolContext<'_>,
    args: MultiSearchArgs,
) -> HandlerResult {
    let queries: Vec<String> = args
        .queries
        .into_iter()
        .map(|query| query.trim().to_string())
        .filter(|query| !query.is_empty())
        .collect();
    if queries.is_empty() {
        return Err(HandlerError::Validation(
            "Tell me which products you are looking for.".to_string(),
        ));
    }

    let mut listings = Vec::with_capacity(queries.len());
    for query in queries {
        let filters = search_filters(cx, SearchArgs { query, ..SearchArgs::default() })?;
        let result = cx.retrieval().search(cx.tenant_id(), &filters).await?;
        let items = cx.remember_products(&result.products).await;
        listings.push(ProductListing { query: filters.query, items });
    }
    Ok(ToolReply::ProductSections(listings))
}

pub async fn product_details(cx: &mut ToolContext<'_>, args: ProductRefArgs) -> HandlerResult {
    let reference = resolve_listed(cx, &args.identifier).await?;
    let product = cx
        .retrieval()
        .catalog()
        .find_by_id(cx.tenant_id(), &reference.product_id)
        .await?
        .ok_or_else(|| no_longer_available(&reference))?;
    Ok(ToolReply::Message(describe(&product)))
}

/// Finds a product the customer picked from the current list, by number or by name.
pub(crate) async fn resolve_listed(
    cx: &ToolContext<'_>,
    identifier: &str,
) -> Result<ProductReference, HandlerError> {
    let found = match parse_sequence_number(identifier) {
        Some(sequence) => cx.shown_by_sequence(sequence),
        None => cx.shown_by_name(identifier),
    };
    if let Some(reference) = found {
        return Ok(reference.clone());
    }
    if cx.shown().is_empty() {
        return Err(HandlerError::NotFound(LIST_EXPIRED.to_string()));
    }
    Err(HandlerError::NotFound(match parse_sequence_number(identifier) {
        Some(sequence) => format!("There is no item {sequence} in the last list."),
        None => format!("I couldn't find \"{}\" in the last list.", identifier.trim()),
    }))
}

pub(crate) fn no_longer_available(reference: &ProductReference) -> HandlerError {
    HandlerError::NotFound(format!("{} is no longer available.", reference.name))
}

fn search_filters(cx: &ToolContext<'_>, args: SearchArgs) -> Result<SearchFilters, HandlerError> {
    let sort = match args.sort_by.as_deref() {
        Some(raw) => SortKey::parse(raw).ok_or_else(|| {
            HandlerError::Validation(format!(
                "I can sort by relevance, price or name, but not by \"{raw}\"."
            ))
        })?,
        None => SortKey::Relevance,
    };
    check_price_range(args.min_price, args.max_price)?;

    let (query, limit) = if is_generic_catalog_query(&args.query) {
        (String::new(), 0)
    } else {
        let limit = match args.limit {
            Some(limit) if limit < 0 => {
                return Err(HandlerError::Validation(
                    "The number of results can't be negative.".to_string(),
                ))
            }
            Some(limit) => usize::try_from(limit).unwrap_or(usize::MAX),
            None => cx.default_limit(),
        };
        (args.query.trim().to_string(), limit)
    };

    Ok(SearchFilters {
        query,
        brand: non_blank(args.brand),
        tags: non_blank(args.tags),
        min_price: args.min_price,
        max_price: args.max_price,
        limit,
        sort,
    })
}

fn check_price_range(min: Option<Decimal>, max: Option<Decimal>) -> Result<(), HandlerError> {
    if min.is_some_and(|min| min < Decimal::ZERO) || max.is_some_and(|max| max < Decimal::ZERO) {
        return Err(HandlerError::Validation("Prices can't be negative.".to_string()));
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(HandlerError::Validation(format!(
                "The minimum price ({}) is above the maximum ({}).",
                format_money(min),
                format_money(max)
            )));
        }
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn describe(product: &CatalogProduct) -> String {
    let mut text = format!("*{}*\n", product.name);
    match product.discounted_price() {
        Some(sale) => text.push_str(&format!(
            "Price: {} (was {})\n",
            format_money(sale),
            format_money(product.price)
        )),
        None => text.push_str(&format!("Price: {}\n", format_money(product.price))),
    }
    if !product.brand.trim().is_empty() {
        text.push_str(&format!("Brand: {}\n", product.brand));
    }
    if !product.description.trim().is_empty() {
        text.push_str(&format!("{}\n", product.description.trim()));
    }
    if product.is_available() {
        text.push_str(&format!("In stock: {} units", product.stock_quantity));
    } else {
        text.push_str("Out of stock right now.");
    }
    text
}
