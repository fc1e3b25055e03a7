pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "casetrack",
    about = "Casetrack operator CLI",
    long_about = "Operate the complaint workflow store: migrations, demo data, config inspection, readiness checks and the failed-notification queue.",
    after_help = "Examples:\n  casetrack doctor --json\n  casetrack notifications failed --actor admin-1\n  casetrack notifications retry 6f1c... --actor admin-1"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo directory and enable auto-routing")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, relay readiness, and database schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(subcommand, about = "Inspect and requeue notifications that gave up")]
    Notifications(NotificationsCommand),
}

#[derive(Debug, Subcommand)]
enum NotificationsCommand {
    #[command(about = "List failed notifications, newest first")]
    Failed {
        #[arg(long, help = "Admin user id to act as")]
        actor: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    #[command(about = "Put a failed notification back into the delivery queue")]
    Retry {
        id: String,
        #[arg(long, help = "Admin user id to act as")]
        actor: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Notifications(NotificationsCommand::Failed { actor, limit }) => {
            commands::notifications::failed(&actor, limit)
        }
        Command::Notifications(NotificationsCommand::Retry { id, actor }) => {
            commands::notifications::retry(&actor, &id)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
