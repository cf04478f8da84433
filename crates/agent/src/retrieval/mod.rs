//! Free-text catalog search through ordered fallback tiers.
//!
//! Tiers run in order and the first one returning anything wins:
//!
//! 1. semantic similarity (skipped for price sorts or when no collaborator is configured),
//! 2. full-text with synonym expansion, then full-text over the raw tokens,
//! 3. case-insensitive substring of the product name,
//! 4. substring of any text field, per expanded token.
//!
//! Brand, tag and price filters hold at every tier; out-of-stock products never qualify.

pub mod semantic;
pub mod suggest;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use storefront_core::catalog::filters::{apply_limit, sort_products, SearchFilters, SortKey};
use storefront_core::catalog::vocabulary::{raw_groups, SynonymVocabulary};
use storefront_core::config::RetrievalConfig;
use storefront_core::domain::product::{CatalogProduct, ProductId};
use storefront_core::domain::tenant::TenantId;
use storefront_db::repositories::{
    CatalogQuery, CatalogRepository, MatchStrategy, RepositoryError,
};

pub use semantic::{HttpSemanticSearch, SemanticError, SemanticMatch, SemanticSearch};
pub use suggest::search_suggestions;

const DEFAULT_SEMANTIC_TIMEOUT: Duration = Duration::from_millis(1500);
const DEFAULT_SEMANTIC_CANDIDATES: usize = 20;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("catalog lookup failed: {0}")]
    Catalog(#[from] RepositoryError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetrievalTier {
    /// A query-less listing of the catalog.
    Listing,
    Semantic,
    ExpandedFullText,
    RawFullText,
    NameContains,
    AnyField,
}

impl RetrievalTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Semantic => "semantic",
            Self::ExpandedFullText => "expanded_full_text",
            Self::RawFullText => "raw_full_text",
            Self::NameContains => "name_contains",
            Self::AnyField => "any_field",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalResult {
    pub products: Vec<CatalogProduct>,
    /// Tier that produced the products; `None` when nothing matched.
    pub tier: Option<RetrievalTier>,
}

impl RetrievalResult {
    fn empty() -> Self {
        Self { products: Vec::new(), tier: None }
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

pub struct RetrievalPipeline {
    catalog: Arc<dyn CatalogRepository>,
    semantic: Option<Arc<dyn SemanticSearch>>,
    vocabulary: Arc<SynonymVocabulary>,
    semantic_timeout: Duration,
    semantic_candidates: usize,
}

impl RetrievalPipeline {
    pub fn new(catalog: Arc<dyn CatalogRepository>, vocabulary: Arc<SynonymVocabulary>) -> Self {
        Self {
            catalog,
            semantic: None,
            vocabulary,
            semantic_timeout: DEFAULT_SEMANTIC_TIMEOUT,
            semantic_candidates: DEFAULT_SEMANTIC_CANDIDATES,
        }
    }

    pub fn with_semantic(mut self, semantic: Arc<dyn SemanticSearch>) -> Self {
        self.semantic = Some(semantic);
        self
    }

    pub fn with_semantic_settings(mut self, timeout: Duration, candidates: usize) -> Self {
        self.semantic_timeout = timeout;
        self.semantic_candidates = candidates.max(1);
        self
    }

    pub fn configure(self, config: &RetrievalConfig) -> Self {
        self.with_semantic_settings(config.semantic_timeout(), config.semantic_candidates)
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogRepository> {
        &self.catalog
    }

    pub async fn search(
        &self,
        tenant_id: &TenantId,
        filters: &SearchFilters,
    ) -> Result<RetrievalResult, RetrievalError> {
        if !filters.has_query() {
            let query = CatalogQuery::new(MatchStrategy::All, filters);
            let products = self.catalog.search(tenant_id, &query).await?;
            return Ok(self.finish(tenant_id, filters, RetrievalTier::Listing, products));
        }

        if let Some(products) = self.semantic_tier(tenant_id, filters).await? {
            return Ok(self.finish(tenant_id, filters, RetrievalTier::Semantic, products));
        }

        let query = filters.query.trim();
        let expanded = self.vocabulary.expand_query(query);
        let mut attempts =
            vec![(RetrievalTier::ExpandedFullText, MatchStrategy::FullText(expanded.clone()))];
        if expanded.iter().any(|group| group.is_expanded()) {
            attempts.push((RetrievalTier::RawFullText, MatchStrategy::FullText(raw_groups(query))));
        }
        attempts
            .push((RetrievalTier::NameContains, MatchStrategy::NameContains(query.to_string())));
        attempts.push((RetrievalTier::AnyField, MatchStrategy::AnyField(expanded)));

        for (tier, strategy) in attempts {
            let products =
                self.catalog.search(tenant_id, &CatalogQuery::new(strategy, filters)).await?;
            if !products.is_empty() {
                return Ok(self.finish(tenant_id, filters, tier, products));
            }
            debug!(
                event_name = "retrieval.tier.miss",
                tenant_id = %tenant_id,
                tier = tier.as_str(),
                "retrieval tier returned nothing"
            );
        }

        info!(
            event_name = "retrieval.no_match",
            tenant_id = %tenant_id,
            query_terms = query.split_whitespace().count(),
            "no tier matched the query"
        );
        Ok(RetrievalResult::empty())
    }

    /// Terms to offer after `query` found nothing. A failed catalog read only costs the
    /// suggestions.
    pub async fn suggestions(&self, tenant_id: &TenantId, query: &str) -> Vec<String> {
        let sample = CatalogQuery::new(
            MatchStrategy::All,
            &SearchFilters::default().with_limit(suggest::SUGGESTION_SAMPLE),
        );
        match self.catalog.search(tenant_id, &sample).await {
            Ok(products) => search_suggestions(&products, query),
            Err(error) => {
                warn!(
                    event_name = "retrieval.suggestions.failed",
                    tenant_id = %tenant_id,
                    error = %error,
                    "could not sample the catalog for suggestions"
                );
                Vec::new()
            }
        }
    }

    /// `Ok(None)` means fall through to the lexical tiers.
    async fn semantic_tier(
        &self,
        tenant_id: &TenantId,
        filters: &SearchFilters,
    ) -> Result<Option<Vec<CatalogProduct>>, RetrievalError> {
        let Some(semantic) = &self.semantic else {
            return Ok(None);
        };
        if filters.sort.is_price_based() {
            return Ok(None);
        }

        let candidates = self.semantic_candidates.max(filters.limit);
        let call = semantic.search_similar(filters.query.trim(), tenant_id, candidates);
        let matches = match tokio::time::timeout(self.semantic_timeout, call).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(error)) => {
                warn!(
                    event_name = "retrieval.semantic.failed",
                    tenant_id = %tenant_id,
                    error = %error,
                    "semantic search failed; falling back to lexical tiers"
                );
                return Ok(None);
            }
            Err(_) => {
                warn!(
                    event_name = "retrieval.semantic.timeout",
                    tenant_id = %tenant_id,
                    timeout_ms = self.semantic_timeout.as_millis() as u64,
                    "semantic search timed out; falling back to lexical tiers"
                );
                return Ok(None);
            }
        };
        if matches.is_empty() {
            return Ok(None);
        }

        let mut seen = HashSet::new();
        let ids: Vec<ProductId> = matches
            .into_iter()
            .map(|hit| hit.product_id)
            .filter(|id| seen.insert(id.clone()))
            .collect();
        let found = self.catalog.find_by_ids(tenant_id, &ids).await?;
        if found.len() < ids.len() {
            warn!(
                event_name = "retrieval.semantic.stale_ids",
                tenant_id = %tenant_id,
                dropped = ids.len() - found.len(),
                "semantic index returned products missing from the catalog"
            );
        }

        let admitted: Vec<CatalogProduct> =
            found.into_iter().filter(|product| filters.admits(product)).collect();
        Ok((!admitted.is_empty()).then_some(admitted))
    }

    fn finish(
        &self,
        tenant_id: &TenantId,
        filters: &SearchFilters,
        tier: RetrievalTier,
        mut products: Vec<CatalogProduct>,
    ) -> RetrievalResult {
        products.retain(|product| filters.admits(product));
        if filters.sort != SortKey::Relevance {
            sort_products(&mut products, filters.sort);
        }
        apply_limit(&mut products, filters.limit);
        info!(
            event_name = "retrieval.tier.hit",
            tenant_id = %tenant_id,
            tier = tier.as_str(),
            sort = filters.sort.as_str(),
            results = products.len(),
            "catalog search resolved"
        );
        RetrievalResult { products, tier: Some(tier) }
    }
}
