use sqlx::{QueryBuilder, Row, Sqlite};

use storefront_core::catalog::filters::{fold_case, SortKey};
use storefront_core::catalog::vocabulary::TokenGroup;
use storefront_core::domain::product::{CatalogProduct, ProductId};
use storefront_core::domain::tenant::TenantId;

use super::{
    format_timestamp, parse_count, parse_decimal, CatalogQuery, CatalogRepository, MatchStrategy,
    RepositoryError,
};
use crate::DbPool;

const PRODUCT_COLUMNS: &str = "p.id, p.tenant_id, p.name, p.description, p.brand, p.tags, p.sku,
        p.category, p.price, p.sale_price, p.stock_quantity";

const EFFECTIVE_PRICE: &str = "(CASE WHEN p.sale_price IS NOT NULL AND CAST(p.sale_price AS REAL) > 0
        THEN CAST(p.sale_price AS REAL) ELSE CAST(p.price AS REAL) END)";

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<CatalogProduct, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: String =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let brand: String = row.try_get("brand").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tags: String = row.try_get("tags").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sku: String = row.try_get("sku").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: Option<String> =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let price: String = row.try_get("price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sale_price: Option<String> =
        row.try_get("sale_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let stock_quantity: i64 =
        row.try_get("stock_quantity").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(CatalogProduct {
        id: ProductId(id),
        tenant_id: TenantId(tenant_id),
        name,
        description,
        brand,
        tags,
        sku,
        category,
        price: parse_decimal("price", &price)?,
        sale_price: sale_price
            .filter(|value| !value.trim().is_empty())
            .map(|value| parse_decimal("sale_price", &value))
            .transpose()?,
        stock_quantity: parse_count("stock_quantity", stock_quantity)?,
    })
}

/// Builds an FTS5 expression: terms of a group are ORed as prefix matches, groups are ANDed.
pub fn fts_expression(groups: &[TokenGroup]) -> Option<String> {
    let clauses: Vec<String> = groups
        .iter()
        .filter_map(|group| {
            let terms: Vec<String> = group
                .terms
                .iter()
                .filter(|term| !term.trim().is_empty())
                .map(|term| format!("\"{}\"*", term.replace('"', "\"\"")))
                .collect();
            (!terms.is_empty()).then(|| format!("({})", terms.join(" OR ")))
        })
        .collect();

    (!clauses.is_empty()).then(|| clauses.join(" AND "))
}

/// `%value%` over folded text, with LIKE wildcards in `value` taken literally.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::from("%");
    for ch in fold_case(value.trim()).chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn push_contains(builder: &mut QueryBuilder<'_, Sqlite>, column: &str, value: &str) {
    builder.push(format!("{column} LIKE "));
    builder.push_bind(like_pattern(value));
    builder.push(" ESCAPE '\\'");
}

/// Every field the any-field tier looks at, folded into one column. Terms are single words,
/// so a match can never straddle two fields.
fn search_folded(product: &CatalogProduct) -> String {
    fold_case(
        &[&product.name, &product.description, &product.brand, &product.tags, &product.sku]
            .map(String::as_str)
            .join("\n"),
    )
}

fn push_order(builder: &mut QueryBuilder<'_, Sqlite>, sort: SortKey) {
    let order = match sort {
        SortKey::Relevance => " ORDER BY p.stock_quantity DESC, p.name COLLATE NOCASE ASC".to_string(),
        SortKey::PriceAsc => {
            format!(" ORDER BY {EFFECTIVE_PRICE} ASC, p.name COLLATE NOCASE ASC")
        }
        SortKey::PriceDesc => {
            format!(" ORDER BY {EFFECTIVE_PRICE} DESC, p.name COLLATE NOCASE ASC")
        }
        SortKey::NameAsc => " ORDER BY p.name COLLATE NOCASE ASC".to_string(),
        SortKey::NameDesc => " ORDER BY p.name COLLATE NOCASE DESC".to_string(),
    };
    builder.push(order);
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ProductId,
    ) -> Result<Option<CatalogProduct>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.tenant_id = ? AND p.id = ?"
        ))
        .bind(&tenant_id.0)
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_product(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_ids(
        &self,
        tenant_id: &TenantId,
        ids: &[ProductId],
    ) -> Result<Vec<CatalogProduct>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.tenant_id = "
        ));
        builder.push_bind(tenant_id.0.clone());
        builder.push(" AND p.id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.0.clone());
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut found = rows.iter().map(row_to_product).collect::<Result<Vec<_>, _>>()?;

        let mut ordered = Vec::with_capacity(found.len());
        for id in ids {
            if let Some(position) = found.iter().position(|product| &product.id == id) {
                ordered.push(found.swap_remove(position));
            }
        }
        Ok(ordered)
    }

    async fn find_by_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.tenant_id = ?
             ORDER BY p.name COLLATE NOCASE ASC"
        ))
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_product).collect::<Result<Vec<_>, _>>()
    }

    async fn search(
        &self,
        tenant_id: &TenantId,
        query: &CatalogQuery,
    ) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products p"));

        let fts = match &query.strategy {
            MatchStrategy::FullText(groups) => match fts_expression(groups) {
                Some(expression) => Some(expression),
                None => return Ok(Vec::new()),
            },
            _ => None,
        };

        if fts.is_some() {
            builder.push(" JOIN products_fts ON products_fts.rowid = p.rowid");
        }

        builder.push(" WHERE p.tenant_id = ");
        builder.push_bind(tenant_id.0.clone());
        builder.push(" AND p.stock_quantity > 0");

        match &query.strategy {
            MatchStrategy::All => {}
            MatchStrategy::FullText(_) => {
                if let Some(expression) = fts {
                    builder.push(" AND products_fts MATCH ");
                    builder.push_bind(expression);
                }
            }
            MatchStrategy::NameContains(text) => {
                if text.trim().is_empty() {
                    return Ok(Vec::new());
                }
                builder.push(" AND ");
                push_contains(&mut builder, "p.name_folded", text);
            }
            MatchStrategy::AnyField(groups) => {
                let groups: Vec<&TokenGroup> =
                    groups.iter().filter(|group| !group.terms.is_empty()).collect();
                if groups.is_empty() {
                    return Ok(Vec::new());
                }
                for group in groups {
                    builder.push(" AND (");
                    for (index, term) in group.terms.iter().enumerate() {
                        if index > 0 {
                            builder.push(" OR ");
                        }
                        push_contains(&mut builder, "p.search_folded", term);
                    }
                    builder.push(")");
                }
            }
        }

        if let Some(brand) = query.brand.as_deref().filter(|value| !value.trim().is_empty()) {
            builder.push(" AND ");
            push_contains(&mut builder, "p.brand_folded", brand);
        }
        if let Some(tags) = query.tags.as_deref().filter(|value| !value.trim().is_empty()) {
            builder.push(" AND ");
            push_contains(&mut builder, "p.tags_folded", tags);
        }
        if let Some(min_price) = query.min_price {
            builder.push(format!(" AND {EFFECTIVE_PRICE} >= CAST("));
            builder.push_bind(min_price.to_string());
            builder.push(" AS REAL)");
        }
        if let Some(max_price) = query.max_price {
            builder.push(format!(" AND {EFFECTIVE_PRICE} <= CAST("));
            builder.push_bind(max_price.to_string());
            builder.push(" AS REAL)");
        }

        push_order(&mut builder, query.sort);

        if query.limit > 0 {
            builder.push(" LIMIT ");
            builder.push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_product).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, product: CatalogProduct) -> Result<(), RepositoryError> {
        let now = format_timestamp(chrono::Utc::now());

        sqlx::query(
            "INSERT INTO products (id, tenant_id, name, description, brand, tags, sku, category,
                                   price, sale_price, stock_quantity, name_folded, brand_folded,
                                   tags_folded, search_folded, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 brand = excluded.brand,
                 tags = excluded.tags,
                 sku = excluded.sku,
                 category = excluded.category,
                 price = excluded.price,
                 sale_price = excluded.sale_price,
                 stock_quantity = excluded.stock_quantity,
                 name_folded = excluded.name_folded,
                 brand_folded = excluded.brand_folded,
                 tags_folded = excluded.tags_folded,
                 search_folded = excluded.search_folded,
                 updated_at = excluded.updated_at",
        )
        .bind(&product.id.0)
        .bind(&product.tenant_id.0)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.brand)
        .bind(&product.tags)
        .bind(&product.sku)
        .bind(&product.category)
        .bind(product.price.to_string())
        .bind(product.sale_price.map(|value| value.to_string()))
        .bind(i64::from(product.stock_quantity))
        .bind(fold_case(&product.name))
        .bind(fold_case(&product.brand))
        .bind(fold_case(&product.tags))
        .bind(search_folded(&product))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use storefront_core::catalog::filters::{SearchFilters, SortKey};
    use storefront_core::catalog::vocabulary::{SynonymVocabulary, TokenGroup};
    use storefront_core::domain::product::{CatalogProduct, ProductId};
    use storefront_core::domain::tenant::{TenantId, TenantProfile};

    use super::{fts_expression, SqlCatalogRepository};
    use crate::repositories::{
        CatalogQuery, CatalogRepository, InMemoryCatalogRepository, MatchStrategy,
        SqlTenantRepository, TenantRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> (DbPool, SqlCatalogRepository, TenantId) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let tenant = TenantId("farmacia-central".to_string());
        SqlTenantRepository::new(pool.clone())
            .save_profile(TenantProfile::placeholder(tenant.clone()))
            .await
            .expect("save tenant");

        let repo = SqlCatalogRepository::new(pool.clone());
        for (id, name, brand, price, sale, stock) in [
            ("p-1", "Dipirona 500mg 10 comprimidos", "Medley", 1290, None, 12),
            ("p-2", "Dipirona gotas 20ml", "EMS", 990, Some(790), 4),
            ("p-3", "Paracetamol 750mg 20 comp", "EMS", 1590, None, 8),
            ("p-4", "Vitamina C 1g efervescente", "Redoxon", 3490, None, 0),
        ] {
            repo.save(CatalogProduct {
                id: ProductId(id.to_string()),
                tenant_id: tenant.clone(),
                name: name.to_string(),
                description: format!("{name} - uso adulto"),
                brand: brand.to_string(),
                tags: "analgesico, febre".to_string(),
                sku: id.to_uppercase(),
                category: Some("medicamentos".to_string()),
                price: Decimal::new(price, 2),
                sale_price: sale.map(|value| Decimal::new(value, 2)),
                stock_quantity: stock,
            })
            .await
            .expect("save product");
        }

        (pool, repo, tenant)
    }

    fn names(products: &[CatalogProduct]) -> Vec<&str> {
        products.iter().map(|product| product.name.as_str()).collect()
    }

    #[test]
    fn fts_expression_ands_groups_and_ors_terms() {
        let groups = vec![
            TokenGroup::single("dipirona"),
            TokenGroup { terms: vec!["comp".to_string(), "comprimidos".to_string()] },
        ];

        assert_eq!(
            fts_expression(&groups).as_deref(),
            Some("(\"dipirona\"*) AND (\"comp\"* OR \"comprimidos\"*)")
        );
        assert_eq!(fts_expression(&[]), None);
    }

    #[tokio::test]
    async fn full_text_search_uses_expanded_groups() {
        let (_pool, repo, tenant) = setup().await;
        let vocabulary = SynonymVocabulary::pharmacy();

        let query = CatalogQuery::new(
            MatchStrategy::FullText(vocabulary.expand_query("comprimidos")),
            &SearchFilters::default(),
        );
        let found = repo.search(&tenant, &query).await.expect("search");

        assert_eq!(names(&found), vec!["Dipirona 500mg 10 comprimidos", "Paracetamol 750mg 20 comp"]);
    }

    #[tokio::test]
    async fn out_of_stock_products_never_match() {
        let (_pool, repo, tenant) = setup().await;

        let query = CatalogQuery::new(
            MatchStrategy::NameContains("vitamina".to_string()),
            &SearchFilters::default(),
        );
        let found = repo.search(&tenant, &query).await.expect("search");

        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn price_sort_uses_effective_price_and_limit() {
        let (_pool, repo, tenant) = setup().await;

        let filters = SearchFilters::default().with_sort(SortKey::PriceAsc).with_limit(2);
        let found = repo.search(&tenant, &CatalogQuery::new(MatchStrategy::All, &filters)).await;
        let found = found.expect("search");

        assert_eq!(names(&found), vec!["Dipirona gotas 20ml", "Dipirona 500mg 10 comprimidos"]);
    }

    #[tokio::test]
    async fn any_field_matches_brand_and_price_range() {
        let (_pool, repo, tenant) = setup().await;

        let filters = SearchFilters {
            max_price: Some(Decimal::new(1000, 2)),
            ..SearchFilters::default()
        };
        let query = CatalogQuery::new(
            MatchStrategy::AnyField(vec![TokenGroup::single("ems")]),
            &filters,
        );
        let found = repo.search(&tenant, &query).await.expect("search");

        assert_eq!(names(&found), vec!["Dipirona gotas 20ml"]);
    }

    #[tokio::test]
    async fn name_matching_folds_accents_like_memory_and_takes_wildcards_literally() {
        let (_pool, repo, tenant) = setup().await;
        let extra = [("p-5", "ÁGUA OXIGENADA 10 VOLUMES"), ("p-6", "Álcool 70% gel 500g")];
        let mut saved = Vec::new();
        for (id, name) in extra {
            let product = CatalogProduct {
                id: ProductId(id.to_string()),
                tenant_id: tenant.clone(),
                name: name.to_string(),
                description: String::new(),
                brand: "Farmax".to_string(),
                tags: String::new(),
                sku: id.to_uppercase(),
                category: Some("higiene".to_string()),
                price: Decimal::new(890, 2),
                sale_price: None,
                stock_quantity: 3,
            };
            repo.save(product.clone()).await.expect("save");
            saved.push(product);
        }
        let memory = InMemoryCatalogRepository::with_products(saved);

        for (text, expected) in [
            ("água", vec!["ÁGUA OXIGENADA 10 VOLUMES"]),
            ("álcool", vec!["Álcool 70% gel 500g"]),
            ("70%", vec!["Álcool 70% gel 500g"]),
            ("_", vec![]),
            ("0%g", vec![]),
        ] {
            let query = CatalogQuery::new(
                MatchStrategy::NameContains(text.to_string()),
                &SearchFilters::default(),
            );
            let sql = repo.search(&tenant, &query).await.expect("sql search");
            let in_memory = memory.search(&tenant, &query).await.expect("memory search");
            assert_eq!(names(&sql), expected, "sql `{text}`");
            assert_eq!(names(&in_memory), expected, "memory `{text}`");
        }

        let any_field = CatalogQuery::new(
            MatchStrategy::AnyField(vec![TokenGroup::single("oxigenada")]),
            &SearchFilters::default(),
        );
        assert_eq!(
            names(&repo.search(&tenant, &any_field).await.expect("search")),
            vec!["ÁGUA OXIGENADA 10 VOLUMES"]
        );
    }

    #[tokio::test]
    async fn find_by_ids_keeps_requested_order_and_skips_unknown() {
        let (_pool, repo, tenant) = setup().await;

        let ids = vec![
            ProductId("p-3".to_string()),
            ProductId("missing".to_string()),
            ProductId("p-1".to_string()),
        ];
        let found = repo.find_by_ids(&tenant, &ids).await.expect("find by ids");

        let found_ids: Vec<_> = found.iter().map(|product| product.id.0.as_str()).collect();
        assert_eq!(found_ids, vec!["p-3", "p-1"]);
    }

    #[tokio::test]
    async fn update_keeps_full_text_index_in_sync() {
        let (_pool, repo, tenant) = setup().await;

        let mut product = repo
            .find_by_id(&tenant, &ProductId("p-3".to_string()))
            .await
            .expect("find")
            .expect("product exists");
        product.name = "Paracetamol infantil".to_string();
        product.description = "Suspensão oral".to_string();
        repo.save(product).await.expect("update product");

        let stale = CatalogQuery::new(
            MatchStrategy::FullText(vec![TokenGroup::single("750mg")]),
            &SearchFilters::default(),
        );
        assert!(repo.search(&tenant, &stale).await.expect("search").is_empty());

        let fresh = CatalogQuery::new(
            MatchStrategy::FullText(vec![TokenGroup::single("infantil")]),
            &SearchFilters::default(),
        );
        assert_eq!(
            names(&repo.search(&tenant, &fresh).await.expect("search")),
            vec!["Paracetamol infantil"]
        );
    }
}
