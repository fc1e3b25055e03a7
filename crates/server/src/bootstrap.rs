use std::sync::Arc;

use casetrack_core::config::{AppConfig, ConfigError, LoadOptions};
use casetrack_core::{
    Clock, ComplaintService, ComplaintStore, DeliveryWorker, DirectoryStore, NotificationAdmin,
    NotificationDispatcher, NotificationStore, SettingsStore, SystemClock,
};
use casetrack_db::{
    connect, migrations, DbPool, SqlComplaintRepository, SqlDirectoryRepository,
    SqlNotificationRepository, SqlSettingsRepository,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::relay::HttpRelayTransport;

/// Every long-lived handle the process needs, wired once at startup.
pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub complaints: Arc<ComplaintService>,
    pub notification_admin: Arc<NotificationAdmin>,
    /// `None` without a relay; notifications then stay pending until one is configured.
    pub delivery_worker: Option<DeliveryWorker>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("relay client could not be built: {0}")]
    Relay(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let complaint_store: Arc<dyn ComplaintStore> = Arc::new(SqlComplaintRepository::new(db_pool.clone()));
    let directory: Arc<dyn DirectoryStore> = Arc::new(SqlDirectoryRepository::new(db_pool.clone()));
    let notifications: Arc<dyn NotificationStore> =
        Arc::new(SqlNotificationRepository::new(db_pool.clone()));
    let settings: Arc<dyn SettingsStore> = Arc::new(SqlSettingsRepository::new(db_pool.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let dispatcher = NotificationDispatcher::new(
        directory.clone(),
        notifications.clone(),
        clock.clone(),
        config.notifications.channel_toggles(),
    );
    let complaints = ComplaintService::new(
        complaint_store,
        directory,
        settings,
        config.workflow.permission_matrix(),
    )
    .with_listener(Arc::new(dispatcher))
    .with_clock(clock.clone())
    .with_max_conflict_retries(config.workflow.max_conflict_retries);

    let policy = config.notifications.delivery_policy();
    let delivery_worker =
        match HttpRelayTransport::from_config(&config.relay).map_err(BootstrapError::Relay)? {
            Some(relay) => {
                info!(
                    event_name = "system.bootstrap.transport_selected",
                    correlation_id = "bootstrap",
                    transport = "http_relay",
                    "notification transport initialized"
                );
                Some(
                    DeliveryWorker::new(notifications.clone(), Arc::new(relay), clock.clone(), policy)
                        .with_batch_size(config.notifications.batch_size)
                        .with_poll_interval(config.notifications.poll_interval()),
                )
            }
            None => {
                warn!(
                    event_name = "system.bootstrap.delivery_disabled",
                    correlation_id = "bootstrap",
                    "relay.url is not set; notifications are queued but not delivered"
                );
                None
            }
        };
    let notification_admin = NotificationAdmin::new(notifications, clock, policy);

    Ok(Application {
        config,
        db_pool,
        complaints: Arc::new(complaints),
        notification_admin: Arc::new(notification_admin),
        delivery_worker,
    })
}

#[cfg(test)]
mod tests {
    use casetrack_core::config::{ConfigOverrides, LoadOptions};
    use casetrack_core::{ComplaintFilter, NatureTypeId, NewComplaint, Principal, Role, UserId};
    use casetrack_db::{seed_demo_directory, SqlDirectoryRepository, SqlSettingsRepository};

    use crate::bootstrap::bootstrap;

    fn overrides(database_url: &str, relay_url: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                relay_url: relay_url.map(str::to_string),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_relay_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                relay_url: Some("ftp://relay.internal".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("relay.url"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn bootstrap_wires_migrated_stores_and_an_idle_queue() {
        let app = bootstrap(overrides("sqlite::memory:?cache=shared", Some("https://relay.test/send")))
            .await
            .expect("bootstrap should succeed with defaults");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('complaint', 'complaint_history', 'notification', 'settings')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("baseline tables should exist after bootstrap");
        assert_eq!(table_count, 4);

        let admin = Principal::new("admin", Role::Admin, None);
        let visible = app
            .complaints
            .list_visible(&admin, ComplaintFilter::default())
            .await
            .expect("query complaints");
        assert!(visible.is_empty());

        let worker = app.delivery_worker.as_ref().expect("relay configured");
        let summary = worker.run_once().await.expect("worker tick");
        assert_eq!(summary.attempted, 0);
        assert!(app.notification_admin.list_failed(&admin, 10).await.expect("failed view").is_empty());

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn without_relay_notifications_stay_pending() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("casetrack.db").display());
        let app = bootstrap(overrides(&url, None)).await.expect("bootstrap");
        assert!(app.delivery_worker.is_none());

        seed_demo_directory(
            &SqlDirectoryRepository::new(app.db_pool.clone()),
            &SqlSettingsRepository::new(app.db_pool.clone()),
        )
        .await
        .expect("seed");
        app.complaints
            .create(
                NewComplaint {
                    title: "Portal login loops".to_string(),
                    description: "Redirects back to the login page".to_string(),
                    nature_type_id: Some(NatureTypeId("access".to_string())),
                    ..NewComplaint::default()
                },
                &UserId("client-acme".to_string()),
                &Principal::new("client-acme", Role::Client, None),
            )
            .await
            .expect("create");
        app.complaints.flush_notifications().await;

        let (queued, pending): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(status = 'pending'), 0) FROM notification",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("count notifications");
        assert!(queued > 0);
        assert_eq!(queued, pending);

        app.db_pool.close().await;
    }
}
