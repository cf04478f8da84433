use crate::commands::{with_database, CommandResult, StepFailure};
use storefront_db::{migrations, DemoSeedDataset, SeedResult, VerificationResult};

pub fn run() -> CommandResult {
    let outcome = with_database("seed", |_config, pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        check_verification(&verification)?;
        Ok(seeded)
    });

    match outcome {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err(failure) => failure,
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo tenant `{}` loaded with {} catalog products",
        seeded.tenant_id, seeded.products_seeded
    )
}

fn check_verification(verification: &VerificationResult) -> Result<(), StepFailure> {
    if verification.all_present {
        return Ok(());
    }

    let failed_checks = verification
        .checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    let message = if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    };
    Err(("seed_verification", message, 6u8))
}
