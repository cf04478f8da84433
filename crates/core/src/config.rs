use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub sessions: SessionConfig,
    pub retrieval: RetrievalConfig,
    pub alerts: AlertConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

/// Tuning of the in-memory conversation store and its background tasks.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub history_limit: usize,
    pub snapshot_every_turns: u32,
    pub default_ttl_secs: u64,
    pub max_idle_secs: u64,
    pub reaper_interval_secs: u64,
    pub snapshot_queue_capacity: usize,
    pub prompt_history_turns: usize,
}

impl SessionConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}

#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    pub semantic_url: Option<String>,
    pub semantic_timeout_ms: u64,
    pub semantic_candidates: usize,
    pub default_limit: usize,
    pub vocabulary_path: Option<PathBuf>,
}

impl RetrievalConfig {
    pub fn semantic_timeout(&self) -> Duration {
        Duration::from_millis(self.semantic_timeout_ms)
    }
}

#[derive(Clone, Debug, Default)]
pub struct AlertConfig {
    pub escalation_webhook_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub server_port: Option<u16>,
    pub semantic_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://storefront.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                temperature: 0.2,
            },
            sessions: SessionConfig {
                history_limit: 10,
                snapshot_every_turns: 3,
                default_ttl_secs: 3_600,
                max_idle_secs: 7 * 24 * 3_600,
                reaper_interval_secs: 3_600,
                snapshot_queue_capacity: 256,
                prompt_history_turns: 6,
            },
            retrieval: RetrievalConfig {
                semantic_url: None,
                semantic_timeout_ms: 1_500,
                semantic_candidates: 20,
                default_limit: 10,
                vocabulary_path: None,
            },
            alerts: AlertConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("storefront.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// The file that `load` would read, if any.
    pub fn resolved_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
        resolve_config_path(explicit_path)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            set(&mut self.database.url, database.url);
            set(&mut self.database.max_connections, database.max_connections);
            set(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(llm) = patch.llm {
            set(&mut self.llm.provider, llm.provider);
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(SecretString::from(api_key));
            }
            set_some(&mut self.llm.base_url, llm.base_url);
            set(&mut self.llm.model, llm.model);
            set(&mut self.llm.timeout_secs, llm.timeout_secs);
            set(&mut self.llm.temperature, llm.temperature);
        }

        if let Some(sessions) = patch.sessions {
            set(&mut self.sessions.history_limit, sessions.history_limit);
            set(&mut self.sessions.snapshot_every_turns, sessions.snapshot_every_turns);
            set(&mut self.sessions.default_ttl_secs, sessions.default_ttl_secs);
            set(&mut self.sessions.max_idle_secs, sessions.max_idle_secs);
            set(&mut self.sessions.reaper_interval_secs, sessions.reaper_interval_secs);
            set(&mut self.sessions.snapshot_queue_capacity, sessions.snapshot_queue_capacity);
            set(&mut self.sessions.prompt_history_turns, sessions.prompt_history_turns);
        }

        if let Some(retrieval) = patch.retrieval {
            set_some(&mut self.retrieval.semantic_url, retrieval.semantic_url);
            set(&mut self.retrieval.semantic_timeout_ms, retrieval.semantic_timeout_ms);
            set(&mut self.retrieval.semantic_candidates, retrieval.semantic_candidates);
            set(&mut self.retrieval.default_limit, retrieval.default_limit);
            set_some(&mut self.retrieval.vocabulary_path, retrieval.vocabulary_path);
        }

        if let Some(alerts) = patch.alerts {
            set_some(&mut self.alerts.escalation_webhook_url, alerts.escalation_webhook_url);
        }

        if let Some(server) = patch.server {
            set(&mut self.server.bind_address, server.bind_address);
            set(&mut self.server.port, server.port);
            set(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(logging) = patch.logging {
            set(&mut self.logging.level, logging.level);
            set(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STOREFRONT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("STOREFRONT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("STOREFRONT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("STOREFRONT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STOREFRONT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("STOREFRONT_LLM_API_KEY") {
            self.llm.api_key = Some(SecretString::from(value));
        }
        if let Some(value) = read_env("STOREFRONT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("STOREFRONT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("STOREFRONT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("STOREFRONT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_LLM_TEMPERATURE") {
            self.llm.temperature = parse_env("STOREFRONT_LLM_TEMPERATURE", &value)?;
        }

        if let Some(value) = read_env("STOREFRONT_SESSIONS_HISTORY_LIMIT") {
            self.sessions.history_limit = parse_env("STOREFRONT_SESSIONS_HISTORY_LIMIT", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_SESSIONS_SNAPSHOT_EVERY_TURNS") {
            self.sessions.snapshot_every_turns =
                parse_env("STOREFRONT_SESSIONS_SNAPSHOT_EVERY_TURNS", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_SESSIONS_DEFAULT_TTL_SECS") {
            self.sessions.default_ttl_secs =
                parse_env("STOREFRONT_SESSIONS_DEFAULT_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_SESSIONS_MAX_IDLE_SECS") {
            self.sessions.max_idle_secs = parse_env("STOREFRONT_SESSIONS_MAX_IDLE_SECS", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_SESSIONS_REAPER_INTERVAL_SECS") {
            self.sessions.reaper_interval_secs =
                parse_env("STOREFRONT_SESSIONS_REAPER_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("STOREFRONT_RETRIEVAL_SEMANTIC_URL") {
            self.retrieval.semantic_url = Some(value);
        }
        if let Some(value) = read_env("STOREFRONT_RETRIEVAL_SEMANTIC_TIMEOUT_MS") {
            self.retrieval.semantic_timeout_ms =
                parse_env("STOREFRONT_RETRIEVAL_SEMANTIC_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_RETRIEVAL_VOCABULARY_PATH") {
            self.retrieval.vocabulary_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("STOREFRONT_ALERTS_ESCALATION_WEBHOOK_URL") {
            self.alerts.escalation_webhook_url = Some(value);
        }

        if let Some(value) = read_env("STOREFRONT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("STOREFRONT_SERVER_PORT") {
            self.server.port = parse_env("STOREFRONT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("STOREFRONT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("STOREFRONT_LOGGING_LEVEL").or_else(|| read_env("STOREFRONT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STOREFRONT_LOGGING_FORMAT").or_else(|| read_env("STOREFRONT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        set(&mut self.database.url, overrides.database_url);
        set(&mut self.logging.level, overrides.log_level);
        set(&mut self.llm.provider, overrides.llm_provider);
        set(&mut self.llm.model, overrides.llm_model);
        set_some(&mut self.llm.base_url, overrides.llm_base_url);
        set(&mut self.server.port, overrides.server_port);
        set_some(&mut self.retrieval.semantic_url, overrides.semantic_url);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_sessions(&self.sessions)?;
        validate_retrieval(&self.retrieval)?;
        validate_alerts(&self.alerts)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn set_some<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("storefront.toml"), PathBuf::from("config/storefront.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_sessions(sessions: &SessionConfig) -> Result<(), ConfigError> {
    if sessions.history_limit < 2 {
        return Err(ConfigError::Validation(
            "sessions.history_limit must be at least 2".to_string(),
        ));
    }

    if sessions.snapshot_every_turns == 0 {
        return Err(ConfigError::Validation(
            "sessions.snapshot_every_turns must be greater than zero".to_string(),
        ));
    }

    if sessions.default_ttl_secs == 0 || sessions.default_ttl_secs > sessions.max_idle_secs {
        return Err(ConfigError::Validation(
            "sessions.default_ttl_secs must be positive and not exceed sessions.max_idle_secs"
                .to_string(),
        ));
    }

    if !(60..=86_400).contains(&sessions.reaper_interval_secs) {
        return Err(ConfigError::Validation(
            "sessions.reaper_interval_secs must be in range 60..=86400".to_string(),
        ));
    }

    if sessions.snapshot_queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "sessions.snapshot_queue_capacity must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_retrieval(retrieval: &RetrievalConfig) -> Result<(), ConfigError> {
    if let Some(url) = &retrieval.semantic_url {
        if !is_http_url(url) {
            return Err(ConfigError::Validation(
                "retrieval.semantic_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if retrieval.semantic_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "retrieval.semantic_timeout_ms must be greater than zero".to_string(),
        ));
    }

    if retrieval.semantic_candidates == 0 {
        return Err(ConfigError::Validation(
            "retrieval.semantic_candidates must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_alerts(alerts: &AlertConfig) -> Result<(), ConfigError> {
    if let Some(url) = &alerts.escalation_webhook_url {
        if !is_http_url(url) {
            return Err(ConfigError::Validation(
                "alerts.escalation_webhook_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    sessions: Option<SessionPatch>,
    retrieval: Option<RetrievalPatch>,
    alerts: Option<AlertPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    history_limit: Option<usize>,
    snapshot_every_turns: Option<u32>,
    default_ttl_secs: Option<u64>,
    max_idle_secs: Option<u64>,
    reaper_interval_secs: Option<u64>,
    snapshot_queue_capacity: Option<usize>,
    prompt_history_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalPatch {
    semantic_url: Option<String>,
    semantic_timeout_ms: Option<u64>,
    semantic_candidates: Option<usize>,
    default_limit: Option<usize>,
    vocabulary_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct AlertPatch {
    escalation_webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
