//! Merges the outcomes of one turn into the single message the customer receives.
//!
//! Only outcomes that are usable reach the merge: successes plus failures that carry an
//! explanation for the customer. Numbers shown in a merged reply always come from one running
//! counter so that "item 3" in the next message is unambiguous.

use tracing::warn;

use storefront_core::catalog::money::format_money;

use crate::tools::reply::{product_line, render_sections, CartAddition, ProductListing};
use crate::tools::{ToolOutcome, ToolReply};

pub const GENERIC_FAILURE_REPLY: &str =
    "Sorry, I couldn't process that. Could you say it another way?";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatedReply {
    pub text: String,
    /// Set when the reply shows the session's product list under new numbers starting here;
    /// the caller renumbers the session list to match.
    pub renumbered_from: Option<u32>,
}

impl AggregatedReply {
    fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), renumbered_from: None }
    }
}

pub fn combine(outcomes: &[ToolOutcome]) -> AggregatedReply {
    let usable: Vec<&ToolOutcome> = outcomes.iter().filter(|outcome| outcome.is_usable()).collect();

    match usable.as_slice() {
        [] => AggregatedReply::text(GENERIC_FAILURE_REPLY),
        [only] => AggregatedReply::text(only.result_text()),
        _ => merge(&usable),
    }
}

fn merge(usable: &[&ToolOutcome]) -> AggregatedReply {
    let mut additions = Vec::new();
    let mut choices = Vec::new();
    let mut listings = Vec::new();
    let mut other = 0usize;
    for outcome in usable {
        match &outcome.reply {
            ToolReply::AddedToCart(addition) if outcome.is_success() => additions.push(addition),
            ToolReply::FoundNotAdded(listing) if outcome.is_success() => choices.push(listing),
            ToolReply::ProductList(listing) if outcome.is_success() => listings.push(listing),
            ToolReply::NoMatches(no_matches) if outcome.is_success() => {
                listings.push(&no_matches.listing)
            }
            ToolReply::ProductSections(sections) if outcome.is_success() => {
                listings.extend(sections.iter())
            }
            _ => other += 1,
        }
    }

    if other == 0 && listings.is_empty() {
        if choices.is_empty() {
            return AggregatedReply::text(consolidated_additions(&additions));
        }
        return additions_then_choices(&additions, &choices);
    }

    let searches = usable
        .iter()
        .filter(|outcome| {
            matches!(
                outcome.reply,
                ToolReply::ProductList(_) | ToolReply::ProductSections(_) | ToolReply::NoMatches(_)
            )
        })
        .count();
    if other == 0
        && additions.is_empty()
        && choices.is_empty()
        && searches >= 2
        && listings.iter().any(|listing| !listing.items.is_empty())
    {
        return AggregatedReply::text(render_sections(&listings, 1));
    }

    let discarded: Vec<&str> = usable[1..].iter().map(|outcome| outcome.name.as_str()).collect();
    warn!(
        event_name = "aggregator.outcomes.discarded",
        kept = %usable[0].name,
        discarded = ?discarded,
        "unrelated tool outcomes in one turn; replying with the first"
    );
    AggregatedReply::text(usable[0].result_text())
}

fn addition_line(number: usize, addition: &CartAddition) -> String {
    format!(
        "{number}. {}x {} - {}",
        addition.quantity,
        addition.product_name,
        format_money(addition.line_total())
    )
}

fn additions_block(additions: &[&CartAddition]) -> String {
    let mut text = "Added to your cart:\n\n".to_string();
    for (index, addition) in additions.iter().enumerate() {
        text.push_str(&addition_line(index + 1, addition));
        text.push('\n');
    }
    text
}

fn consolidated_additions(additions: &[&CartAddition]) -> String {
    let mut text = additions_block(additions);
    if let Some(last) = additions.last() {
        text.push_str(&format!("\nCart total: {}", format_money(last.cart_total)));
    }
    text
}

fn additions_then_choices(
    additions: &[&CartAddition],
    choices: &[&ProductListing],
) -> AggregatedReply {
    let mut text = String::new();
    if let Some(last) = additions.last() {
        text.push_str(&additions_block(additions));
        text.push_str(&format!("Cart total: {}\n\n", format_money(last.cart_total)));
    }

    let first_choice = u32::try_from(additions.len()).unwrap_or(u32::MAX).saturating_add(1);
    let mut counter = first_choice;
    for listing in choices {
        text.push_str(&format!("For {} I found more than one option:\n", listing.title()));
        for item in &listing.items {
            text.push_str(&product_line(counter, item));
            text.push('\n');
            counter += 1;
        }
        text.push('\n');
    }
    text.push_str("Which one would you like? Reply with the item number.");
    AggregatedReply { text, renumbered_from: Some(first_choice) }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use storefront_core::domain::product::ProductId;
    use storefront_core::domain::session::ProductReference;

    use super::{combine, GENERIC_FAILURE_REPLY};
    use crate::tools::reply::{CartAddition, NoMatches, ProductListing};
    use crate::tools::{ErrorKind, ToolInvocation, ToolOutcome, ToolReply};

    fn ok(name: &str, reply: ToolReply) -> ToolOutcome {
        ToolOutcome::succeeded(&ToolInvocation::new(name, json!({})), reply)
    }

    fn failed(name: &str, kind: ErrorKind, message: &str) -> ToolOutcome {
        ToolOutcome::failed(&ToolInvocation::new(name, json!({})), kind, message)
    }

    fn added(name: &str, quantity: u32, cents: i64, total_cents: i64) -> ToolOutcome {
        ok(
            "add_to_cart",
            ToolReply::AddedToCart(CartAddition {
                product_name: name.to_string(),
                quantity,
                unit_price: Decimal::new(cents, 2),
                cart_total: Decimal::new(total_cents, 2),
            }),
        )
    }

    fn reference(sequential_id: u32, name: &str) -> ProductReference {
        ProductReference {
            sequential_id,
            product_id: ProductId(format!("p-{sequential_id}")),
            name: name.to_string(),
            price: Decimal::new(1000, 2),
            discounted_price: None,
            description: String::new(),
        }
    }

    fn listing(query: &str, items: Vec<ProductReference>) -> ProductListing {
        ProductListing { query: query.to_string(), items }
    }

    #[test]
    fn single_outcome_is_returned_unchanged() {
        let outcome = ok("store_location", ToolReply::message("We are at Rua A, 10."));
        assert_eq!(combine(&[outcome]).text, "We are at Rua A, 10.");
    }

    #[test]
    fn nothing_usable_gives_generic_reply() {
        assert_eq!(combine(&[]).text, GENERIC_FAILURE_REPLY);
        let outcomes = [
            failed("teleport", ErrorKind::UnknownTool, "unknown"),
            failed("view_cart", ErrorKind::Persistence, "db down"),
        ];
        assert_eq!(combine(&outcomes).text, GENERIC_FAILURE_REPLY);
    }

    #[test]
    fn recoverable_failure_alone_is_shown() {
        let outcomes = [
            failed("add_to_cart", ErrorKind::NotFound, "That list has expired."),
            failed("view_cart", ErrorKind::Persistence, "db down"),
        ];
        assert_eq!(combine(&outcomes).text, "That list has expired.");
    }

    #[test]
    fn additions_are_consolidated_with_fresh_numbers() {
        let reply = combine(&[added("Soro", 2, 690, 1380), added("Gaze", 1, 1000, 2380)]);
        assert_eq!(
            reply.text,
            "Added to your cart:\n\n1. 2x Soro - R$ 13,80\n2. 1x Gaze - R$ 10,00\n\nCart total: R$ 23,80"
        );
        assert_eq!(reply.renumbered_from, None);
    }

    #[test]
    fn choices_continue_after_additions() {
        let choices = ok(
            "add_product_by_name",
            ToolReply::FoundNotAdded(listing(
                "dipirona",
                vec![reference(1, "Dipirona 500mg"), reference(2, "Dipirona gotas")],
            )),
        );
        let reply = combine(&[added("Soro", 1, 690, 690), choices]);

        assert_eq!(reply.renumbered_from, Some(2));
        assert!(reply.text.starts_with("Added to your cart:\n\n1. 1x Soro - R$ 6,90\n"));
        assert!(reply.text.contains("For \"dipirona\" I found more than one option:\n2. Dipirona 500mg"));
        assert!(reply.text.contains("\n3. Dipirona gotas"));
    }

    #[test]
    fn several_choice_lists_share_one_counter() {
        let first = ok(
            "add_product_by_name",
            ToolReply::FoundNotAdded(listing("dipirona", vec![reference(1, "A"), reference(2, "B")])),
        );
        let second = ok(
            "add_product_by_name",
            ToolReply::FoundNotAdded(listing("soro", vec![reference(3, "C"), reference(4, "D")])),
        );
        let reply = combine(&[first, second]);
        assert_eq!(reply.renumbered_from, Some(1));
        assert!(reply.text.starts_with("For \"dipirona\" I found more than one option:\n1. A"));
        assert!(reply.text.contains("For \"soro\" I found more than one option:\n3. C"));
    }

    #[test]
    fn searches_merge_into_sections_with_a_running_counter() {
        let first = ok(
            "search_products",
            ToolReply::ProductList(listing("caderno", vec![reference(1, "Caderno"), reference(2, "Caderno A5")])),
        );
        let empty = ok(
            "search_products",
            ToolReply::NoMatches(NoMatches {
                listing: listing("borracha", Vec::new()),
                suggestions: vec!["caneta".to_string()],
            }),
        );
        let second =
            ok("search_products", ToolReply::ProductList(listing("lápis", vec![reference(3, "Lápis")])));

        let reply = combine(&[first, empty, second]);
        assert!(reply.text.contains("*\"caderno\"*\n1. Caderno"));
        assert!(reply.text.contains("*\"borracha\"*\nNo products found."));
        assert!(reply.text.contains("*\"lápis\"*\n3. Lápis"));
    }

    #[test]
    fn searches_without_any_result_fall_back_to_first() {
        let first = ok("search_products", ToolReply::ProductList(listing("x", Vec::new())));
        let second = ok("search_products", ToolReply::ProductList(listing("y", Vec::new())));
        let reply = combine(&[first.clone(), second]);
        assert_eq!(reply.text, first.result_text());
    }

    #[test]
    fn unrelated_outcomes_keep_the_first() {
        let reply = combine(&[
            ok("view_cart", ToolReply::message("Your cart is empty.")),
            ok("store_location", ToolReply::message("We are at Rua A, 10.")),
        ]);
        assert_eq!(reply.text, "Your cart is empty.");
    }

    #[test]
    fn addition_with_a_declined_addition_keeps_the_first() {
        let reply = combine(&[
            added("Soro", 1, 690, 690),
            failed("add_to_cart", ErrorKind::Conflict, "Sorry, Xarope is out of stock."),
        ]);
        assert!(reply.text.starts_with("Added 1x Soro"));
    }
}
