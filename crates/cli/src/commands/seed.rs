use casetrack_db::{seed_demo_directory, SqlDirectoryRepository, SqlSettingsRepository};

use crate::commands::{open_migrated_pool, prepare, CommandResult};

/// Loads the demo directory (departments, staff, clients, nature types) and turns on
/// round-robin auto-routing. Re-running converges on the same data.
pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated_pool(&config).await?;
        let directory = SqlDirectoryRepository::new(pool.clone());
        let settings = SqlSettingsRepository::new(pool.clone());

        let summary = seed_demo_directory(&directory, &settings)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;
        pool.close().await;

        Ok(format!(
            "seeded demo directory: {} users, {} departments, {} nature types (auto-routing {})",
            summary.users,
            summary.departments,
            summary.nature_types,
            if summary.auto_routing_enabled { "enabled" } else { "disabled" }
        ))
    });

    CommandResult::from_step("seed", result)
}
