use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::CatalogProduct;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Whatever order the producing tier considers best.
    #[default]
    Relevance,
    PriceAsc,
    PriceDesc,
    NameAsc,
    NameDesc,
}

impl SortKey {
    /// Accepts the canonical keys plus the aliases customers' assistants tend to emit.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "relevance" | "relevancia" | "relevância" => Some(Self::Relevance),
            "price_asc" | "preco_menor" | "preço_menor" | "cheapest" => Some(Self::PriceAsc),
            "price_desc" | "preco_maior" | "preço_maior" | "most_expensive" => {
                Some(Self::PriceDesc)
            }
            "name_asc" | "nome" | "name" => Some(Self::NameAsc),
            "name_desc" | "nome_desc" => Some(Self::NameDesc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
            Self::NameAsc => "name_asc",
            Self::NameDesc => "name_desc",
        }
    }

    pub fn is_price_based(&self) -> bool {
        matches!(self, Self::PriceAsc | Self::PriceDesc)
    }
}

/// Parameters of one catalog search. `limit == 0` means no cap.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub query: String,
    pub brand: Option<String>,
    pub tags: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub limit: usize,
    pub sort: SortKey,
}

impl SearchFilters {
    pub fn query(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Self::default() }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    /// Hard constraints every tier applies: positive stock, brand and tag substrings,
    /// and the price range over the effective price.
    pub fn admits(&self, product: &CatalogProduct) -> bool {
        if !product.is_available() {
            return false;
        }
        if let Some(brand) = non_blank(self.brand.as_deref()) {
            if !contains_ignore_case(&product.brand, brand) {
                return false;
            }
        }
        if let Some(tags) = non_blank(self.tags.as_deref()) {
            if !contains_ignore_case(&product.tags, tags) {
                return false;
            }
        }
        let price = product.effective_price();
        if self.min_price.is_some_and(|min| price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| price > max) {
            return false;
        }
        true
    }

    pub fn has_query(&self) -> bool {
        !self.query.trim().is_empty()
    }
}

/// Orders products in place for an explicit sort key. `Relevance` keeps the incoming order.
pub fn sort_products(products: &mut [CatalogProduct], sort: SortKey) {
    match sort {
        SortKey::Relevance => {}
        SortKey::PriceAsc => products.sort_by(|left, right| {
            left.effective_price().cmp(&right.effective_price()).then_with(|| by_name(left, right))
        }),
        SortKey::PriceDesc => products.sort_by(|left, right| {
            right.effective_price().cmp(&left.effective_price()).then_with(|| by_name(left, right))
        }),
        SortKey::NameAsc => products.sort_by(by_name),
        SortKey::NameDesc => products.sort_by(|left, right| by_name(right, left)),
    }
}

/// Default order of the lexical tiers: most stock first, then name.
pub fn sort_by_availability(products: &mut [CatalogProduct]) {
    products.sort_by(|left, right| {
        right.stock_quantity.cmp(&left.stock_quantity).then_with(|| by_name(left, right))
    });
}

pub fn apply_limit(products: &mut Vec<CatalogProduct>, limit: usize) {
    if limit > 0 {
        products.truncate(limit);
    }
}

fn by_name(left: &CatalogProduct, right: &CatalogProduct) -> Ordering {
    left.name.to_lowercase().cmp(&right.name.to_lowercase())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    fold_case(haystack).contains(&fold_case(needle.trim()))
}

/// Unicode lowercase; the one case folding every substring match in the catalog uses.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{apply_limit, sort_by_availability, sort_products, SearchFilters, SortKey};
    use crate::domain::product::{CatalogProduct, ProductId};
    use crate::domain::tenant::TenantId;

    fn product(id: &str, name: &str, price: i64, stock: u32) -> CatalogProduct {
        CatalogProduct {
            id: ProductId(id.to_string()),
            tenant_id: TenantId("t-1".to_string()),
            name: name.to_string(),
            description: String::new(),
            brand: "EMS".to_string(),
            tags: "vitaminas, imunidade".to_string(),
            sku: id.to_uppercase(),
            category: None,
            price: Decimal::new(price, 2),
            sale_price: None,
            stock_quantity: stock,
        }
    }

    #[test]
    fn parses_portuguese_sort_aliases() {
        assert_eq!(SortKey::parse("preco_menor"), Some(SortKey::PriceAsc));
        assert_eq!(SortKey::parse("preco_maior"), Some(SortKey::PriceDesc));
        assert_eq!(SortKey::parse("nome"), Some(SortKey::NameAsc));
        assert_eq!(SortKey::parse("popularity"), None);
        assert!(SortKey::PriceDesc.is_price_based());
        assert!(!SortKey::NameAsc.is_price_based());
    }

    #[test]
    fn filters_exclude_out_of_stock_and_out_of_range() {
        let filters = SearchFilters {
            min_price: Some(Decimal::new(1000, 2)),
            max_price: Some(Decimal::new(3000, 2)),
            brand: Some("ems".to_string()),
            tags: Some("IMUNIDADE".to_string()),
            ..SearchFilters::default()
        };

        assert!(filters.admits(&product("a", "Vitamina C", 1500, 2)));
        assert!(!filters.admits(&product("b", "Vitamina C", 1500, 0)));
        assert!(!filters.admits(&product("c", "Vitamina D", 900, 5)));
        assert!(!filters.admits(&product("d", "Vitamina E", 3100, 5)));
    }

    #[test]
    fn price_sort_is_monotonic_with_name_tiebreak() {
        let mut products = vec![
            product("a", "Zinco", 2000, 1),
            product("b", "Acerola", 1000, 1),
            product("c", "Biotina", 2000, 1),
        ];

        sort_products(&mut products, SortKey::PriceAsc);
        let names: Vec<_> = products.iter().map(|product| product.name.as_str()).collect();
        assert_eq!(names, vec!["Acerola", "Biotina", "Zinco"]);

        sort_products(&mut products, SortKey::PriceDesc);
        let names: Vec<_> = products.iter().map(|product| product.name.as_str()).collect();
        assert_eq!(names, vec!["Biotina", "Zinco", "Acerola"]);
    }

    #[test]
    fn availability_order_and_zero_limit_sentinel() {
        let mut products = vec![
            product("a", "Beta", 100, 1),
            product("b", "Alfa", 100, 9),
            product("c", "Gama", 100, 9),
        ];

        sort_by_availability(&mut products);
        let ids: Vec<_> = products.iter().map(|product| product.id.0.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        apply_limit(&mut products, 0);
        assert_eq!(products.len(), 3);
        apply_limit(&mut products, 2);
        assert_eq!(products.len(), 2);
    }
}
