use crate::commands::{open_migrated_pool, prepare, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("migrate") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated_pool(&config).await?;
        pool.close().await;
        Ok("applied pending migrations".to_string())
    });

    CommandResult::from_step("migrate", result)
}
