use std::path::{Path, PathBuf};
use std::sync::Arc;

use storefront_agent::alerts::{notifier_from_config, AlertError};
use storefront_agent::llm::{LlmError, OpenAiCompatibleClient};
use storefront_agent::prompt::{PromptError, PromptRenderer};
use storefront_agent::retrieval::semantic::{HttpSemanticSearch, SemanticError};
use storefront_agent::retrieval::RetrievalPipeline;
use storefront_agent::session::reaper::SessionReaper;
use storefront_agent::session::snapshot::{SnapshotQueue, WriterStats};
use storefront_agent::session::{SessionSettings, SessionStore};
use storefront_agent::tools::{CommerceServices, ToolDispatcher};
use storefront_agent::ConversationOrchestrator;
use storefront_core::catalog::vocabulary::SynonymVocabulary;
use storefront_core::clock::SystemClock;
use storefront_core::config::{AppConfig, RetrievalConfig};
use storefront_db::repositories::{
    RepositoryError, SqlCatalogRepository, SqlSessionSnapshotRepository,
};
use storefront_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub reaper: SessionReaper,
    pub snapshot_writer: JoinHandle<WriterStats>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("session warm start failed: {0}")]
    WarmStart(#[source] RepositoryError),
    #[error("failed to read vocabulary `{path}`: {source}")]
    VocabularyRead { path: PathBuf, source: std::io::Error },
    #[error("failed to parse vocabulary `{path}`: {source}")]
    VocabularyParse { path: PathBuf, source: toml::de::Error },
    #[error("semantic search client: {0}")]
    Semantic(#[from] SemanticError),
    #[error("alert notifier: {0}")]
    Alerts(#[from] AlertError),
    #[error("llm client: {0}")]
    Llm(#[from] LlmError),
    #[error("prompt templates: {0}")]
    Prompt(#[from] PromptError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let snapshots = Arc::new(SqlSessionSnapshotRepository::new(db_pool.clone()));
    let (queue, writer) =
        SnapshotQueue::channel(config.sessions.snapshot_queue_capacity, snapshots.clone());
    let sessions = SessionStore::new(
        SessionSettings::from_config(&config.sessions),
        Arc::new(SystemClock),
    )
    .with_snapshot_queue(queue);
    sessions.warm_start(snapshots.as_ref()).await.map_err(BootstrapError::WarmStart)?;
    let sessions = Arc::new(sessions);
    let snapshot_writer = writer.spawn();

    let retrieval = retrieval_pipeline(&config.retrieval, db_pool.clone())?;
    let dispatcher = ToolDispatcher::new(
        sessions.clone(),
        CommerceServices::sql(db_pool.clone()),
        Arc::new(retrieval),
        notifier_from_config(&config.alerts)?,
    )
    .with_default_limit(config.retrieval.default_limit);

    let llm = OpenAiCompatibleClient::from_config(&config.llm)?;
    info!(
        event_name = "system.bootstrap.llm_configured",
        correlation_id = "bootstrap",
        provider = config.llm.provider.as_str(),
        model = %config.llm.model,
        endpoint = %llm.endpoint(),
        "language model client configured"
    );

    let orchestrator = ConversationOrchestrator::new(
        Arc::new(dispatcher),
        Arc::new(llm),
        Arc::new(PromptRenderer::new()?),
    )
    .with_session_ttl(config.sessions.default_ttl())
    .with_prompt_history_turns(config.sessions.prompt_history_turns);

    let reaper = SessionReaper::new(sessions, config.sessions.reaper_interval());

    Ok(Application {
        config,
        db_pool,
        orchestrator: Arc::new(orchestrator),
        reaper,
        snapshot_writer,
    })
}

fn retrieval_pipeline(
    config: &RetrievalConfig,
    db_pool: DbPool,
) -> Result<RetrievalPipeline, BootstrapError> {
    let vocabulary = load_vocabulary(config.vocabulary_path.as_deref())?;
    let pipeline =
        RetrievalPipeline::new(Arc::new(SqlCatalogRepository::new(db_pool)), Arc::new(vocabulary))
            .configure(config);

    match config.semantic_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => {
            let semantic = HttpSemanticSearch::new(url, config.semantic_timeout())?;
            info!(
                event_name = "system.bootstrap.semantic_enabled",
                correlation_id = "bootstrap",
                endpoint = %semantic.endpoint(),
                "semantic retrieval tier enabled"
            );
            Ok(pipeline.with_semantic(Arc::new(semantic)))
        }
        _ => Ok(pipeline),
    }
}

/// Built-in pharmacy vocabulary, extended by the configured file when there is one.
fn load_vocabulary(path: Option<&Path>) -> Result<SynonymVocabulary, BootstrapError> {
    let mut vocabulary = SynonymVocabulary::pharmacy();
    let Some(path) = path else {
        return Ok(vocabulary);
    };

    let raw = std::fs::read_to_string(path).map_err(|source| {
        BootstrapError::VocabularyRead { path: path.to_path_buf(), source }
    })?;
    let extension = SynonymVocabulary::from_toml_str(&raw).map_err(|source| {
        BootstrapError::VocabularyParse { path: path.to_path_buf(), source }
    })?;
    vocabulary.merge(&extension);
    info!(
        event_name = "system.bootstrap.vocabulary_loaded",
        correlation_id = "bootstrap",
        path = %path.display(),
        terms = vocabulary.len(),
        "synonym vocabulary extended from file"
    );
    Ok(vocabulary)
}

#[cfg(test)]
mod tests {
    use super::{bootstrap_with_config, load_vocabulary};
    use crate::test_support::in_memory_config;

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_starts_empty() {
        let app = bootstrap_with_config(in_memory_config()).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('products', 'conversation_sessions', 'orders')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 3);
        assert!(app.orchestrator.sessions().is_empty().await);
        assert!(!app.reaper.is_running());

        app.db_pool.close().await;
    }

    #[test]
    fn missing_vocabulary_file_is_reported_with_its_path() {
        let error = load_vocabulary(Some(std::path::Path::new("/nonexistent/vocabulary.toml")))
            .expect_err("missing file");
        assert!(error.to_string().contains("/nonexistent/vocabulary.toml"));
        assert!(load_vocabulary(None).expect("built-in").len() > 10);
    }
}
