use crate::commands::{with_database, CommandResult};
use storefront_db::migrations;

pub fn run() -> CommandResult {
    let outcome = with_database("migrate", |_config, pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))
    });

    match outcome {
        Ok(()) => CommandResult::success(
            "migrate",
            format!("schema is up to date ({} migrations known)", migrations::known_count()),
        ),
        Err(failure) => failure,
    }
}
