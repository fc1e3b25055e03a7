use async_trait::async_trait;
use casetrack_core::chrono::Utc;
use sqlx::Row;

use casetrack_core::routing::AutoRoutingConfig;
use casetrack_core::store::{SettingsStore, StoreError};

use super::{db_error, format_timestamp, RepositoryError};
use crate::DbPool;

/// Settings record holding the auto-routing policy.
pub const SYSTEM_SETTINGS: &str = "system";

pub struct SqlSettingsRepository {
    pool: DbPool,
}

impl SqlSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for SqlSettingsRepository {
    async fn auto_routing(&self) -> Result<AutoRoutingConfig, StoreError> {
        let row = sqlx::query("SELECT payload_json FROM settings WHERE type = ?")
            .bind(SYSTEM_SETTINGS)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(AutoRoutingConfig::default());
        };
        let payload: String = row.try_get("payload_json").map_err(db_error)?;
        let document: serde_json::Value =
            serde_json::from_str(&payload).map_err(RepositoryError::from)?;
        match document.get("auto_routing") {
            Some(section) => Ok(serde_json::from_value(section.clone()).map_err(RepositoryError::from)?),
            None => Ok(AutoRoutingConfig::default()),
        }
    }

    /// Replaces only the `auto_routing` section; other keys of the record are kept.
    async fn save_auto_routing(&self, config: &AutoRoutingConfig) -> Result<(), StoreError> {
        let section = serde_json::to_value(config).map_err(RepositoryError::from)?;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let existing = sqlx::query("SELECT payload_json FROM settings WHERE type = ?")
            .bind(SYSTEM_SETTINGS)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
        let mut document = match existing {
            Some(row) => {
                let payload: String = row.try_get("payload_json").map_err(db_error)?;
                serde_json::from_str::<serde_json::Value>(&payload).map_err(RepositoryError::from)?
            }
            None => serde_json::json!({}),
        };
        match document.as_object_mut() {
            Some(object) => {
                object.insert("auto_routing".to_string(), section);
            }
            None => document = serde_json::json!({ "auto_routing": section }),
        }

        sqlx::query(
            "INSERT INTO settings (type, payload_json, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(type) DO UPDATE SET
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at",
        )
        .bind(SYSTEM_SETTINGS)
        .bind(document.to_string())
        .bind(format_timestamp(Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)
    }
}

#[cfg(test)]
mod tests {
    use casetrack_core::domain::directory::DepartmentId;
    use casetrack_core::routing::{AutoRoutingConfig, RoutingStrategy};
    use casetrack_core::store::SettingsStore;

    use super::SqlSettingsRepository;
    use crate::migrations;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn missing_settings_default_to_manual_routing() {
        let repo = SqlSettingsRepository::new(setup_pool().await);
        assert_eq!(repo.auto_routing().await.expect("load"), AutoRoutingConfig::default());
    }

    #[tokio::test]
    async fn auto_routing_round_trips() {
        let repo = SqlSettingsRepository::new(setup_pool().await);
        let config = AutoRoutingConfig {
            enabled: true,
            departments: vec![DepartmentId("a".to_string()), DepartmentId("b".to_string())],
            default_department: Some(DepartmentId("a".to_string())),
            strategy: RoutingStrategy::LeastLoaded,
        };

        repo.save_auto_routing(&config).await.expect("save");
        repo.save_auto_routing(&config).await.expect("save again");

        assert_eq!(repo.auto_routing().await.expect("load"), config);
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
