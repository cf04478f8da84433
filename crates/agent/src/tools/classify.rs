//! Named text classifiers that steer tool handling.
//!
//! Every heuristic about what the customer's words mean lives here, so handlers and the
//! aggregator never pattern-match on message text themselves.

use storefront_core::domain::session::{Role, Turn};

use super::ToolInvocation;

/// Tools that act on the cart as a result of a single product request.
const CART_ACTIONS: &[&str] =
    &["add_to_cart", "add_product_by_name", "update_cart_quantity", "view_cart"];

const ADD_ACTIONS: &[&str] = &["add_to_cart", "add_product_by_name"];

const MULTIPLE_ITEM_MARKERS: &[&str] =
    &[" e ", ", ", " mais ", " também", " tambem", " outro", " outra", " and "];

const GENERIC_CATALOG_QUERIES: &[&str] = &[
    "",
    "products",
    "catalog",
    "menu",
    "all",
    "produtos",
    "catálogo",
    "catalogo",
    "cardápio",
    "cardapio",
    "todos",
    "mostrar produtos",
    "ver produtos",
    "listar produtos",
    "produtos disponíveis",
    "produtos disponiveis",
];

const LISTING_VERBS: &[&str] = &["mostrar", "ver", "listar", "show", "list"];

const GREETINGS: &[&str] = &[
    "oi",
    "olá",
    "ola",
    "hello",
    "hi",
    "hey",
    "bom dia",
    "boa tarde",
    "boa noite",
    "e aí",
    "e ai",
    "eai",
    "opa",
    "tudo bem",
    "tudo certo",
    "como vai",
    "oi tudo bem",
    "ola tudo bem",
    "olá tudo bem",
    "oi bom dia",
    "olá bom dia",
    "oi boa tarde",
    "olá boa tarde",
    "oi boa noite",
    "olá boa noite",
];

/// Strengths, pack sizes, colors and paper specs a customer adds to narrow a search.
const REFINEMENT_MARKERS: &[&str] = &[
    "mg", "ml", "comprimidos", "cápsulas", "capsulas", "gotas", "a3", "a4", "a5", "folhas",
    "páginas", "paginas", "cm", "mm", "azul", "preto", "vermelho", "verde", "branco", "amarelo",
    "unidades", "caixas", "pacotes", "unids", "pçs", "com capa", "sem pauta", "pautado", "liso",
    "quadriculado",
];

/// Fragments of the replies that show a product list to the customer.
const LISTING_REPLY_MARKERS: &[&str] =
    &["here is what i found", "here is our catalog", "reply with the item number"];

/// Words that make a customer message read as a product request.
const REQUEST_WORDS: &[&str] = &[
    "quero", "queria", "preciso", "busco", "procuro", "tem", "vende", "vendem", "want", "need",
    "have", "looking",
];

/// Request words and fillers dropped when a previous message is reused as a search query.
const QUERY_FILLERS: &[&str] = &[
    "quero", "queria", "preciso", "busco", "procuro", "tem", "vende", "vendem", "vocês", "voces",
    "vcs", "você", "voce", "de", "do", "da", "o", "a", "os", "as", "um", "uma", "algum",
    "alguma", "i", "want", "need", "you", "have", "any", "some", "looking", "for",
];

const REFINEMENT_MAX_WORDS: usize = 4;
const REFINEMENT_LOOKBACK: usize = 6;

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// A query asking for the catalog as a whole rather than for specific products.
pub fn is_generic_catalog_query(query: &str) -> bool {
    let query = normalize(query);
    if GENERIC_CATALOG_QUERIES.contains(&query.as_str()) {
        return true;
    }
    let mentions_products = query.contains("produto") || query.contains("product");
    mentions_products && LISTING_VERBS.iter().any(|verb| query.contains(verb))
}

/// A greeting with nothing else in it, e.g. "oi", "bom dia!".
pub fn is_simple_greeting(message: &str) -> bool {
    let message = normalize(message);
    let trimmed = message.trim_end_matches(|ch: char| matches!(ch, '!' | '.' | '?' | ',' | ' '));
    GREETINGS.contains(&trimmed)
}

/// Reads a customer's reference to a listed item: `3`, `#3`, `item 3`, `nº 3`.
pub fn parse_sequence_number(identifier: &str) -> Option<u32> {
    let normalized = normalize(identifier);
    let digits = normalized
        .trim_start_matches("item")
        .trim_start_matches("número")
        .trim_start_matches("numero")
        .trim_start_matches("nº")
        .trim_start_matches('#')
        .trim();
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Order numbers are issued as `ORD-` followed by eight hex digits.
pub fn looks_like_order_number(identifier: &str) -> bool {
    normalize(identifier).starts_with("ord-")
}

fn mentions_multiple_items(message: &str) -> bool {
    let message = format!(" {} ", normalize(message));
    MULTIPLE_ITEM_MARKERS.iter().any(|marker| message.contains(marker))
}

/// True when the model proposed several cart actions for what reads as a single-item request.
pub fn cart_actions_conflict(message: &str, tool_names: &[&str]) -> bool {
    let cart_actions = tool_names.iter().filter(|name| CART_ACTIONS.contains(*name)).count();
    cart_actions > 1 && !mentions_multiple_items(message)
}

/// Keeps one cart action when [`cart_actions_conflict`] holds: an addition when the customer
/// asked to add, the cart view when they asked to see it, otherwise the first cart action.
/// Non-cart invocations are kept as they are.
pub fn filter_cart_actions(message: &str, invocations: Vec<ToolInvocation>) -> Vec<ToolInvocation> {
    let names: Vec<&str> = invocations.iter().map(|invocation| invocation.name.as_str()).collect();
    if !cart_actions_conflict(message, &names) {
        return invocations;
    }

    let lowered = normalize(message);
    let is_cart_action =
        |invocation: &ToolInvocation| CART_ACTIONS.contains(&invocation.name.as_str());
    let position_of = |names: &[&str]| {
        invocations.iter().position(|invocation| names.contains(&invocation.name.as_str()))
    };

    let wants_addition = ["adiciona", "quero", "add"].iter().any(|word| lowered.contains(word));
    let wants_cart_view = ["ver", "carrinho", "cart"].iter().any(|word| lowered.contains(word));
    let mut preferred = None;
    if wants_addition {
        preferred = position_of(ADD_ACTIONS);
    }
    if preferred.is_none() && wants_cart_view {
        preferred = position_of(&["view_cart"]);
    }
    let preferred = preferred.or_else(|| invocations.iter().position(is_cart_action));

    invocations
        .into_iter()
        .enumerate()
        .filter(|(index, invocation)| !is_cart_action(invocation) || Some(*index) == preferred)
        .map(|(_, invocation)| invocation)
        .collect()
}

fn words(text: &str) -> Vec<String> {
    normalize(text)
        .split(|ch: char| ch.is_whitespace() || matches!(ch, '?' | '!' | '.' | ','))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_product_listing_reply(text: &str) -> bool {
    let text = normalize(text);
    LISTING_REPLY_MARKERS.iter().any(|marker| text.contains(marker))
}

/// The search terms of a product request, e.g. "vocês tem dipirona?" gives "dipirona".
pub fn search_terms(message: &str) -> Option<String> {
    let terms: Vec<String> =
        words(message).into_iter().filter(|word| !QUERY_FILLERS.contains(&word.as_str())).collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}

/// Detects a short follow-up such as "500mg" or "caixa com 20 comprimidos" that only narrows
/// the customer's previous search. Returns the combined query to search for: the previous
/// request's terms followed by the refinement.
///
/// `history` holds the turns before `message`. The previous request counts when the store
/// answered it with a product list within the last few turns, or when it reads as a product
/// request on its own.
pub fn refinement_of_previous_search(message: &str, history: &[Turn]) -> Option<String> {
    let refinement = normalize(message);
    let word_count = words(&refinement).len();
    if word_count == 0
        || word_count > REFINEMENT_MAX_WORDS
        || parse_sequence_number(&refinement).is_some()
    {
        return None;
    }
    if !REFINEMENT_MARKERS.iter().any(|marker| refinement.contains(marker)) {
        return None;
    }

    let recent = &history[history.len().saturating_sub(REFINEMENT_LOOKBACK)..];
    let previous_request = recent.iter().rev().find(|turn| turn.role == Role::User)?;
    let listed_products = recent
        .iter()
        .any(|turn| turn.role == Role::Assistant && is_product_listing_reply(&turn.content));
    let reads_as_request = words(&previous_request.content)
        .iter()
        .any(|word| REQUEST_WORDS.contains(&word.as_str()));
    if !listed_products && !reads_as_request {
        return None;
    }

    let previous = search_terms(&previous_request.content)?;
    if previous.contains(&refinement) {
        return None;
    }
    Some(format!("{previous} {}", refinement.trim()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use storefront_core::domain::session::Turn;

    use super::{
        cart_actions_conflict, filter_cart_actions, is_generic_catalog_query, is_simple_greeting,
        looks_like_order_number, parse_sequence_number, refinement_of_previous_search,
        search_terms,
    };
    use crate::tools::ToolInvocation;

    fn invocation(name: &str) -> ToolInvocation {
        ToolInvocation::new(name, json!({}))
    }

    #[test]
    fn generic_catalog_queries_are_recognized() {
        for query in ["", "  ", "Produtos", "catálogo", "cardápio", "menu", "mostrar os produtos"] {
            assert!(is_generic_catalog_query(query), "{query:?} should be generic");
        }
        for query in ["dipirona", "protetor solar", "ver dipirona"] {
            assert!(!is_generic_catalog_query(query), "{query:?} should be specific");
        }
    }

    #[test]
    fn greetings_only_match_when_nothing_else_is_asked() {
        assert!(is_simple_greeting("Oi"));
        assert!(is_simple_greeting("bom dia!"));
        assert!(is_simple_greeting("  olá tudo bem? "));
        assert!(!is_simple_greeting("oi, quero dipirona"));
        assert!(!is_simple_greeting("boa tarde, tem soro?"));
    }

    #[test]
    fn sequence_numbers_accept_common_prefixes() {
        assert_eq!(parse_sequence_number("3"), Some(3));
        assert_eq!(parse_sequence_number("#12"), Some(12));
        assert_eq!(parse_sequence_number("item 4"), Some(4));
        assert_eq!(parse_sequence_number("nº 2"), Some(2));
        assert_eq!(parse_sequence_number("dipirona"), None);
        assert_eq!(parse_sequence_number("3a"), None);
        assert_eq!(parse_sequence_number(""), None);
    }

    #[test]
    fn order_numbers_are_detected_case_insensitively() {
        assert!(looks_like_order_number("ord-1a2b3c4d"));
        assert!(!looks_like_order_number("2"));
    }

    #[test]
    fn several_cart_actions_for_one_item_conflict() {
        assert!(cart_actions_conflict("adiciona uma dipirona", &["add_to_cart", "view_cart"]));
        assert!(!cart_actions_conflict("dipirona e soro", &["add_to_cart", "add_to_cart"]));
        assert!(!cart_actions_conflict("quero dipirona, soro", &["add_to_cart", "add_to_cart"]));
        assert!(!cart_actions_conflict("adiciona dipirona", &["add_to_cart", "search_products"]));
    }

    #[test]
    fn filter_prefers_the_addition_when_customer_asks_to_add() {
        let kept = filter_cart_actions(
            "adiciona uma dipirona",
            vec![invocation("view_cart"), invocation("add_to_cart"), invocation("store_location")],
        );
        let names: Vec<&str> = kept.iter().map(|invocation| invocation.name.as_str()).collect();
        assert_eq!(names, vec!["add_to_cart", "store_location"]);
    }

    #[test]
    fn filter_prefers_cart_view_when_customer_asks_to_see_it() {
        let kept = filter_cart_actions(
            "me mostra o carrinho",
            vec![invocation("update_cart_quantity"), invocation("view_cart")],
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "view_cart");
    }

    #[test]
    fn filter_falls_back_to_first_cart_action() {
        let kept = filter_cart_actions(
            "dipirona",
            vec![invocation("update_cart_quantity"), invocation("add_product_by_name")],
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "update_cart_quantity");
    }

    #[test]
    fn filter_keeps_everything_for_multi_item_requests() {
        let kept = filter_cart_actions(
            "quero dipirona e soro",
            vec![invocation("add_product_by_name"), invocation("add_product_by_name")],
        );
        assert_eq!(kept.len(), 2);
    }

    fn exchange(question: &str, answer: &str) -> Vec<Turn> {
        let now = Utc::now();
        vec![Turn::user(question, now), Turn::assistant(answer, now)]
    }

    #[test]
    fn search_terms_drop_request_words() {
        assert_eq!(search_terms("Vocês tem dipirona?").as_deref(), Some("dipirona"));
        assert_eq!(search_terms("quero um caderno").as_deref(), Some("caderno"));
        assert_eq!(search_terms("tem?"), None);
    }

    #[test]
    fn refinement_after_a_listing_combines_both_queries() {
        let history = exchange(
            "dipirona",
            "Here is what I found for \"dipirona\":\n\n1. Dipirona 500mg - R$ 9,90",
        );
        assert_eq!(
            refinement_of_previous_search("1g", &history),
            None,
            "no refinement marker"
        );
        assert_eq!(
            refinement_of_previous_search("gotas", &history).as_deref(),
            Some("dipirona gotas")
        );
    }

    #[test]
    fn refinement_after_a_plain_request_combines_both_queries() {
        let history = exchange("tem omeprazol?", "Which strength would you like?");
        assert_eq!(
            refinement_of_previous_search("20mg", &history).as_deref(),
            Some("omeprazol 20mg")
        );
    }

    #[test]
    fn unrelated_or_long_messages_are_not_refinements() {
        let history = exchange("oi", "Hello! Welcome to Farmácia Demo.");
        assert_eq!(refinement_of_previous_search("20mg", &history), None, "no earlier request");
        assert_eq!(refinement_of_previous_search("20mg", &[]), None, "no history");

        let history = exchange("tem omeprazol?", "Which strength would you like?");
        assert_eq!(refinement_of_previous_search("3", &history), None, "a pick, not a refinement");
        assert_eq!(
            refinement_of_previous_search("quero saber se entrega em casa com 20mg", &history),
            None
        );
    }
}
