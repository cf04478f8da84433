//! Alternatives offered when a search finds nothing, drawn from the tenant's own catalog.

use std::collections::HashMap;

use storefront_core::catalog::filters::fold_case;
use storefront_core::domain::product::CatalogProduct;

pub const MAX_SUGGESTIONS: usize = 3;
/// How many in-stock products are sampled to pick suggestions from.
pub const SUGGESTION_SAMPLE: usize = 50;

const MIN_TAG_COUNT: usize = 2;
const MIN_WORD_COUNT: usize = 3;
const MIN_BRAND_COUNT: usize = 2;

const STOP_WORDS: &[&str] = &[
    "para", "com", "sem", "por", "mais", "menos", "super", "mega", "kit", "pack", "unidade",
    "unidades", "caixa", "conjunto", "with", "without",
];

/// Up to [`MAX_SUGGESTIONS`] terms the customer could search for instead of `query`: frequent
/// tags first, then frequent words of product names, then frequent brands. Terms overlapping
/// the query or an earlier suggestion are skipped. Ties go to the alphabetically first term.
pub fn search_suggestions(sample: &[CatalogProduct], query: &str) -> Vec<String> {
    let query = fold_case(query.trim());
    let mut tags = HashMap::new();
    let mut words = HashMap::new();
    let mut brands = HashMap::new();

    for product in sample {
        for tag in product.tags.split(',').map(str::trim).filter(|tag| tag.chars().count() > 2) {
            *tags.entry(fold_case(tag)).or_insert(0usize) += 1;
        }
        for word in fold_case(&product.name).split_whitespace() {
            if word.chars().count() > 3 && !STOP_WORDS.contains(&word) && !has_digit(word) {
                *words.entry(word.to_string()).or_insert(0usize) += 1;
            }
        }
        let brand = product.brand.trim();
        if !brand.is_empty() {
            *brands.entry(brand.to_string()).or_insert(0usize) += 1;
        }
    }

    let mut suggestions: Vec<String> = Vec::with_capacity(MAX_SUGGESTIONS);
    let sources = [(tags, MIN_TAG_COUNT), (words, MIN_WORD_COUNT), (brands, MIN_BRAND_COUNT)];
    for (counts, minimum) in sources {
        for term in ranked(counts, minimum) {
            if suggestions.len() == MAX_SUGGESTIONS {
                return suggestions;
            }
            let folded = fold_case(&term);
            let overlaps = |other: &str| other.contains(&folded) || folded.contains(other);
            if (!query.is_empty() && overlaps(query.as_str()))
                || suggestions.iter().any(|existing| overlaps(fold_case(existing).as_str()))
            {
                continue;
            }
            suggestions.push(term);
        }
    }
    suggestions
}

fn ranked(counts: HashMap<String, usize>, minimum: usize) -> Vec<String> {
    let mut terms: Vec<(String, usize)> =
        counts.into_iter().filter(|(_, count)| *count >= minimum).collect();
    terms.sort_by(|(a, a_count), (b, b_count)| b_count.cmp(a_count).then_with(|| a.cmp(b)));
    terms.into_iter().map(|(term, _)| term).collect()
}

/// Strengths and sizes such as `500mg` or `20ml` make poor suggestions.
fn has_digit(word: &str) -> bool {
    word.chars().any(|ch| ch.is_ascii_digit())
}
