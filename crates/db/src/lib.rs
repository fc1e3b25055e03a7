pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, ping, DbPool};
pub use fixtures::{seed_demo_directory, SeedSummary};
pub use repositories::{
    InMemoryComplaintRepository, InMemoryDirectoryRepository, InMemoryNotificationRepository,
    InMemorySettingsRepository, RepositoryError, SqlComplaintRepository, SqlDirectoryRepository,
    SqlNotificationRepository, SqlSettingsRepository,
};
