use rust_decimal::Decimal;

use storefront_core::catalog::money::format_money;
use storefront_core::domain::session::ProductReference;

pub(crate) const ADD_BY_NUMBER_HINT: &str = "Reply with the item number to add it to your cart.";

/// Products shown to the customer, numbered with their session sequence ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductListing {
    /// What the customer searched for; empty for a full catalog listing.
    pub query: String,
    pub items: Vec<ProductReference>,
}

impl ProductListing {
    pub fn title(&self) -> String {
        if self.query.trim().is_empty() {
            "Our catalog".to_string()
        } else {
            format!("\"{}\"", self.query.trim())
        }
    }
}

/// One category of a full catalog listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogSection {
    pub category: String,
    pub items: Vec<ProductReference>,
}

/// A search that found nothing, with other terms the catalog does carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoMatches {
    /// Always empty of items; kept as a listing so merged replies can show the query.
    pub listing: ProductListing,
    pub suggestions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartAddition {
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// Cart total right after this addition.
    pub cart_total: Decimal,
}

impl CartAddition {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Structured result of one tool; rendered to text only when it reaches the customer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolReply {
    Message(String),
    ProductList(ProductListing),
    /// The whole catalog grouped by category, numbered continuously across sections.
    Catalog(Vec<CatalogSection>),
    NoMatches(NoMatches),
    /// One listing per query of a multi-product search, numbered continuously.
    ProductSections(Vec<ProductListing>),
    AddedToCart(CartAddition),
    /// Several products matched a name; they were listed instead of added.
    FoundNotAdded(ProductListing),
}

impl ToolReply {
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(text.into())
    }

    pub fn render(&self) -> String {
        match self {
            Self::Message(text) => text.clone(),
            Self::ProductList(listing) => render_listing(listing),
            Self::Catalog(sections) => render_catalog(sections),
            Self::NoMatches(no_matches) => render_no_matches(no_matches),
            Self::ProductSections(listings) => {
                let refs: Vec<&ProductListing> = listings.iter().collect();
                let first = listings
                    .iter()
                    .flat_map(|listing| listing.items.first())
                    .next()
                    .map_or(1, |item| item.sequential_id);
                render_sections(&refs, first)
            }
            Self::AddedToCart(addition) => format!(
                "Added {}x {} ({} each) to your cart.\nCart total: {}",
                addition.quantity,
                addition.product_name,
                format_money(addition.unit_price),
                format_money(addition.cart_total)
            ),
            Self::FoundNotAdded(listing) => {
                let mut text = format!(
                    "I found more than one product for {}:\n\n",
                    listing.title()
                );
                for item in &listing.items {
                    text.push_str(&product_line(item.sequential_id, item));
                    text.push('\n');
                }
                text.push_str("\nWhich one would you like? Reply with the item number.");
                text
            }
        }
    }
}

fn render_listing(listing: &ProductListing) -> String {
    if listing.items.is_empty() {
        return if listing.query.trim().is_empty() {
            "The catalog has no products available right now.".to_string()
        } else {
            format!(
                "I couldn't find products for {}. Try another name or send 'products' to see the catalog.",
                listing.title()
            )
        };
    }

    let mut text = if listing.query.trim().is_empty() {
        "Here is our catalog:\n\n".to_string()
    } else {
        format!("Here is what I found for {}:\n\n", listing.title())
    };
    for item in &listing.items {
        text.push_str(&product_line(item.sequential_id, item));
        text.push('\n');
    }
    text.push('\n');
    text.push_str(ADD_BY_NUMBER_HINT);
    text
}

fn render_catalog(sections: &[CatalogSection]) -> String {
    if sections.iter().all(|section| section.items.is_empty()) {
        return "The catalog has no products available right now.".to_string();
    }
    let mut text = "Here is our catalog:\n".to_string();
    for section in sections.iter().filter(|section| !section.items.is_empty()) {
        text.push_str(&format!("\n*{}*\n", section.category));
        for item in &section.items {
            text.push_str(&product_line(item.sequential_id, item));
            text.push('\n');
        }
    }
    text.push('\n');
    text.push_str(ADD_BY_NUMBER_HINT);
    text
}

fn render_no_matches(no_matches: &NoMatches) -> String {
    let mut text = format!("I couldn't find products for {}.", no_matches.listing.title());
    match no_matches.suggestions.as_slice() {
        [] => text.push_str(" Try another name or send 'products' to see the catalog."),
        suggestions => {
            let quoted: Vec<String> =
                suggestions.iter().map(|suggestion| format!("\"{suggestion}\"")).collect();
            text.push_str(&format!(
                " You could try {}, or send 'products' to see the catalog.",
                quoted.join(", ")
            ));
        }
    }
    text
}

/// Labeled sections numbered by one running counter starting at `first`.
pub fn render_sections(listings: &[&ProductListing], first: u32) -> String {
    let mut counter = first;
    let mut text = "Here is what I found:\n".to_string();
    for listing in listings {
        text.push_str(&format!("\n*{}*\n", listing.title()));
        if listing.items.is_empty() {
            text.push_str("No products found.\n");
        }
        for item in &listing.items {
            text.push_str(&product_line(counter, item));
            text.push('\n');
            counter += 1;
        }
    }
    text.push('\n');
    text.push_str(ADD_BY_NUMBER_HINT);
    text
}

/// `3. Dipirona 500mg - R$ 9,90 (was R$ 12,90)`
pub fn product_line(number: u32, item: &ProductReference) -> String {
    match item.discounted_price {
        Some(discounted) => format!(
            "{number}. {} - {} (was {})",
            item.name,
            format_money(discounted),
            format_money(item.price)
        ),
        None => format!("{number}. {} - {}", item.name, format_money(item.price)),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use storefront_core::domain::product::ProductId;
    use storefront_core::domain::session::ProductReference;

    use super::{
        product_line, render_sections, CartAddition, CatalogSection, NoMatches, ProductListing,
        ToolReply,
    };

    fn reference(sequential_id: u32, name: &str, cents: i64, sale: Option<i64>) -> ProductReference {
        ProductReference {
            sequential_id,
            product_id: ProductId(format!("p-{sequential_id}")),
            name: name.to_string(),
            price: Decimal::new(cents, 2),
            discounted_price: sale.map(|cents| Decimal::new(cents, 2)),
            description: String::new(),
        }
    }

    #[test]
    fn product_line_shows_sale_price_first() {
        let line = product_line(3, &reference(3, "Dipirona 500mg", 1290, Some(990)));
        assert_eq!(line, "3. Dipirona 500mg - R$ 9,90 (was R$ 12,90)");
        assert_eq!(product_line(1, &reference(1, "Soro", 690, None)), "1. Soro - R$ 6,90");
    }

    #[test]
    fn listing_uses_session_numbers_and_hint() {
        let reply = ToolReply::ProductList(ProductListing {
            query: "dipirona".to_string(),
            items: vec![reference(1, "Dipirona 500mg", 990, None), reference(2, "Dipirona gotas", 1450, None)],
        });
        let text = reply.render();
        assert!(text.starts_with("Here is what I found for \"dipirona\":"));
        assert!(text.contains("\n2. Dipirona gotas - R$ 14,50\n"));
        assert!(text.ends_with("Reply with the item number to add it to your cart."));
    }

    #[test]
    fn empty_listing_suggests_catalog_command() {
        let reply =
            ToolReply::ProductList(ProductListing { query: "xyz".to_string(), items: Vec::new() });
        assert!(reply.render().contains("send 'products'"));
    }

    #[test]
    fn sections_share_one_counter_and_label_empty_queries() {
        let first = ProductListing {
            query: "dipirona".to_string(),
            items: vec![reference(1, "Dipirona 500mg", 990, None), reference(2, "Dipirona gotas", 1450, None)],
        };
        let empty = ProductListing { query: "xyz".to_string(), items: Vec::new() };
        let second =
            ProductListing { query: "soro".to_string(), items: vec![reference(3, "Soro", 690, None)] };

        let text = render_sections(&[&first, &empty, &second], 1);
        assert!(text.contains("*\"dipirona\"*\n1. Dipirona 500mg"));
        assert!(text.contains("*\"xyz\"*\nNo products found."));
        assert!(text.contains("*\"soro\"*\n3. Soro - R$ 6,90"));
    }

    #[test]
    fn addition_reports_cart_total() {
        let reply = ToolReply::AddedToCart(CartAddition {
            product_name: "Soro".to_string(),
            quantity: 2,
            unit_price: Decimal::new(690, 2),
            cart_total: Decimal::new(2370, 2),
        });
        assert_eq!(
            reply.render(),
            "Added 2x Soro (R$ 6,90 each) to your cart.\nCart total: R$ 23,70"
        );
    }

    #[test]
    fn catalog_groups_items_under_their_category() {
        let reply = ToolReply::Catalog(vec![
            CatalogSection {
                category: "Analgésicos".to_string(),
                items: vec![reference(1, "Dipirona 500mg", 990, None), reference(2, "Dorflex", 1890, None)],
            },
            CatalogSection { category: "Vitaminas".to_string(), items: Vec::new() },
            CatalogSection {
                category: "Other products".to_string(),
                items: vec![reference(3, "Soro", 690, None)],
            },
        ]);
        let text = reply.render();
        assert!(text.starts_with("Here is our catalog:\n\n*Analgésicos*\n1. Dipirona 500mg"));
        assert!(text.contains("2. Dorflex - R$ 18,90\n\n*Other products*\n3. Soro"));
        assert!(!text.contains("Vitaminas"));
    }

    #[test]
    fn no_matches_offer_suggestions_when_there_are_any() {
        let listing = ProductListing { query: "xyz".to_string(), items: Vec::new() };
        let with = ToolReply::NoMatches(NoMatches {
            listing: listing.clone(),
            suggestions: vec!["dor".to_string(), "febre".to_string()],
        });
        assert_eq!(
            with.render(),
            "I couldn't find products for \"xyz\". You could try \"dor\", \"febre\", or send 'products' to see the catalog."
        );

        let without = ToolReply::NoMatches(NoMatches { listing, suggestions: Vec::new() });
        assert!(without.render().ends_with("Try another name or send 'products' to see the catalog."));
    }
}
