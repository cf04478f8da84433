use std::env;
use std::fs;
use std::path::Path;

use serde::Serialize;
use storefront_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    command: &'static str,
    status: &'static str,
    precedence: &'static str,
    entries: Vec<ConfigEntry>,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            )
        }
    };

    let config_file_path = AppConfig::resolved_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key: &'static str, env_key: &'static str| {
        field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let entries = effective_values(&config)
        .into_iter()
        .map(|(key, env_key, value)| ConfigEntry { key, value, source: source(key, env_key) })
        .collect();
    let report = ConfigReport {
        command: "config",
        status: "ok",
        precedence: "env > file > default",
        entries,
    };

    match serde_json::to_string(&report) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("config", "serialization", error.to_string(), 7),
    }
}

/// `(key, environment variable, displayed value)` for every setting, secrets redacted.
fn effective_values(config: &AppConfig) -> Vec<(&'static str, &'static str, String)> {
    vec![
        ("database.url", "STOREFRONT_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "STOREFRONT_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "STOREFRONT_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        ("llm.provider", "STOREFRONT_LLM_PROVIDER", config.llm.provider.as_str().to_string()),
        ("llm.model", "STOREFRONT_LLM_MODEL", config.llm.model.clone()),
        ("llm.base_url", "STOREFRONT_LLM_BASE_URL", optional(config.llm.base_url.as_deref())),
        (
            "llm.api_key",
            "STOREFRONT_LLM_API_KEY",
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
        ),
        ("llm.timeout_secs", "STOREFRONT_LLM_TIMEOUT_SECS", config.llm.timeout_secs.to_string()),
        (
            "sessions.default_ttl_secs",
            "STOREFRONT_SESSIONS_DEFAULT_TTL_SECS",
            config.sessions.default_ttl_secs.to_string(),
        ),
        (
            "sessions.max_idle_secs",
            "STOREFRONT_SESSIONS_MAX_IDLE_SECS",
            config.sessions.max_idle_secs.to_string(),
        ),
        (
            "sessions.reaper_interval_secs",
            "STOREFRONT_SESSIONS_REAPER_INTERVAL_SECS",
            config.sessions.reaper_interval_secs.to_string(),
        ),
        (
            "retrieval.semantic_url",
            "STOREFRONT_RETRIEVAL_SEMANTIC_URL",
            optional(config.retrieval.semantic_url.as_deref()),
        ),
        (
            "alerts.escalation_webhook_url",
            "STOREFRONT_ALERTS_ESCALATION_WEBHOOK_URL",
            config
                .alerts
                .escalation_webhook_url
                .as_deref()
                .map(redact_url)
                .unwrap_or_else(|| "<unset>".to_string()),
        ),
        (
            "server.bind_address",
            "STOREFRONT_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        ("server.port", "STOREFRONT_SERVER_PORT", config.server.port.to_string()),
        ("logging.level", "STOREFRONT_LOGGING_LEVEL", config.logging.level.clone()),
        (
            "logging.format",
            "STOREFRONT_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn optional(value: Option<&str>) -> String {
    value.unwrap_or("<unset>").to_string()
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    toml::from_str::<Value>(&raw).ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps scheme and host; paths and queries of webhook URLs often carry tokens.
fn redact_url(url: &str) -> String {
    let trimmed = url.trim();
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return "<redacted>".to_string();
    };
    let host = rest.split(['/', '?']).next().unwrap_or_default();
    if rest.len() == host.len() {
        return format!("{scheme}://{host}");
    }
    format!("{scheme}://{host}/***")
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_url};

    #[test]
    fn webhook_urls_keep_only_scheme_and_host() {
        assert_eq!(
            redact_url("https://hooks.example.com/services/T000/B000/secret"),
            "https://hooks.example.com/***"
        );
        assert_eq!(redact_url("https://alerts.local"), "https://alerts.local");
        assert_eq!(redact_url("not a url"), "<redacted>");
    }

    #[test]
    fn nested_keys_are_found_in_the_config_file() {
        let doc: toml::Value =
            toml::from_str("[llm]\nmodel = \"gpt-4o-mini\"\n").expect("toml");
        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.api_key"));
        assert!(!contains_path(&doc, "server.port"));
    }
}
