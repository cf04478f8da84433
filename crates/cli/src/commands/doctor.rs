use serde::Serialize;
use storefront_core::config::{AppConfig, LlmProvider, LoadOptions};
use storefront_db::{connect_with_settings, migrations, ping};

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    command: &'static str,
    status: CheckStatus,
    summary: &'static str,
    checks: Vec<DoctorCheck>,
}

/// Exit code 0 when every check passes, 1 when any fails.
pub fn run() -> CommandResult {
    let report = build_report();
    let exit_code = if report.status == CheckStatus::Pass { 0 } else { 1 };

    match serde_json::to_string(&report) {
        Ok(output) => CommandResult { exit_code, output },
        Err(error) => CommandResult::failure("doctor", "serialization", error.to_string(), 7),
    }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_llm_settings(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            let reason = "configuration did not load";
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped("llm_settings", reason));
            checks.push(DoctorCheck::skipped("database_connectivity", reason));
            checks.push(DoctorCheck::skipped("schema_migrations", reason));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    DoctorReport {
        command: "doctor",
        status: if all_pass { CheckStatus::Pass } else { CheckStatus::Fail },
        summary: if all_pass {
            "all readiness checks passed"
        } else {
            "one or more readiness checks failed"
        },
        checks,
    }
}

/// Only inspects settings; the model endpoint is not called.
fn check_llm_settings(config: &AppConfig) -> DoctorCheck {
    let llm = &config.llm;
    let endpoint = llm.base_url.as_deref().unwrap_or(match llm.provider {
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Ollama => "http://localhost:11434",
    });
    let credentials = if llm.api_key.is_some() { "with api key" } else { "without api key" };
    DoctorCheck::pass(
        "llm_settings",
        format!(
            "{} model `{}` at {endpoint} {credentials}, timeout {}s",
            llm.provider.as_str(),
            llm.model,
            llm.timeout_secs
        ),
    )
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("schema_migrations", "the database was not reachable"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("schema_migrations", "the database was not reachable"),
                ];
            }
        };

        let mut checks = Vec::with_capacity(2);
        match ping(&pool).await {
            Ok(()) => checks.push(DoctorCheck::pass(
                "database_connectivity",
                format!("connected using `{}`", config.database.url),
            )),
            Err(error) => {
                checks.push(DoctorCheck::fail(
                    "database_connectivity",
                    format!("ping failed: {error}"),
                ));
                checks.push(DoctorCheck::skipped(
                    "schema_migrations",
                    "the database was not reachable",
                ));
                pool.close().await;
                return checks;
            }
        }

        checks.push(match migrations::pending_count(&pool).await {
            Ok(0) => DoctorCheck::pass(
                "schema_migrations",
                format!("all {} migrations applied", migrations::known_count()),
            ),
            Ok(pending) => DoctorCheck::fail(
                "schema_migrations",
                format!("{pending} pending migration(s); run `storefront migrate`"),
            ),
            Err(error) => DoctorCheck::fail(
                "schema_migrations",
                format!("could not read migration ledger: {error}"),
            ),
        });

        pool.close().await;
        checks
    })
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{CheckStatus, DoctorCheck, DoctorReport};

    #[test]
    fn report_serializes_as_a_single_json_line() {
        let report = DoctorReport {
            command: "doctor",
            status: CheckStatus::Fail,
            summary: "one or more readiness checks failed",
            checks: vec![
                DoctorCheck::pass("config_validation", "ok"),
                DoctorCheck::skipped("schema_migrations", "the database was not reachable"),
            ],
        };

        let output = serde_json::to_string(&report).expect("serialize");
        assert!(!output.contains('\n'));
        let payload: Value = serde_json::from_str(&output).expect("json");
        assert_eq!(payload["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
        assert_eq!(
            payload["checks"][1]["details"],
            "skipped because the database was not reachable"
        );
    }
}
