use std::sync::Arc;

use casetrack_core::{
    DeliveryPolicy, DirectoryStore, Notification, NotificationAdmin, NotificationAdminError,
    NotificationId, Principal, SystemClock, UserId,
};
use casetrack_db::{DbPool, SqlDirectoryRepository, SqlNotificationRepository};

use crate::commands::{open_migrated_pool, prepare, CommandResult, StepError};

pub fn failed(actor: &str, limit: u32) -> CommandResult {
    let (config, runtime) = match prepare("notifications.failed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated_pool(&config).await?;
        let principal = resolve_actor(&pool, actor).await?;
        let admin = admin_view(&pool, config.notifications.delivery_policy());

        let failed = admin.list_failed(&principal, limit).await.map_err(admin_error)?;
        pool.close().await;
        Ok(render_failed(&failed))
    });

    CommandResult::from_step("notifications.failed", result)
}

pub fn retry(actor: &str, notification_id: &str) -> CommandResult {
    let (config, runtime) = match prepare("notifications.retry") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated_pool(&config).await?;
        let principal = resolve_actor(&pool, actor).await?;
        let admin = admin_view(&pool, config.notifications.delivery_policy());

        let id = NotificationId(notification_id.to_string());
        let requeued = admin.retry(&principal, &id).await.map_err(admin_error)?;
        pool.close().await;
        Ok(format!(
            "notification {} requeued for {} via {}",
            requeued.id, requeued.user_id, requeued.channel
        ))
    });

    CommandResult::from_step("notifications.retry", result)
}

fn admin_view(pool: &DbPool, policy: DeliveryPolicy) -> NotificationAdmin {
    NotificationAdmin::new(
        Arc::new(SqlNotificationRepository::new(pool.clone())),
        Arc::new(SystemClock),
        policy,
    )
}

/// Operators act as a directory user; inactive or unknown users are refused.
async fn resolve_actor(pool: &DbPool, actor: &str) -> Result<Principal, StepError> {
    let directory = SqlDirectoryRepository::new(pool.clone());
    let user = directory
        .find_user(&UserId(actor.to_string()))
        .await
        .map_err(|error| ("storage", error.to_string(), 4u8))?
        .filter(|user| user.is_active)
        .ok_or_else(|| ("unknown_actor", format!("no active user `{actor}`"), 7u8))?;
    Ok(user.principal())
}

fn admin_error(error: NotificationAdminError) -> StepError {
    match error {
        NotificationAdminError::Forbidden => ("forbidden", error.to_string(), 7),
        NotificationAdminError::NotFound(_) => ("not_found", error.to_string(), 8),
        NotificationAdminError::NotRetryable { .. } | NotificationAdminError::OutOfOrder { .. } => {
            ("not_retryable", error.to_string(), 9)
        }
        NotificationAdminError::Store(_) => ("storage", error.to_string(), 4),
    }
}

fn render_failed(failed: &[Notification]) -> String {
    let mut lines = vec![format!("{} failed notification(s)", failed.len())];
    for notification in failed {
        lines.push(format!(
            "- {} complaint={} user={} channel={} attempts={} error={}",
            notification.id,
            notification.complaint_id,
            notification.user_id,
            notification.channel,
            notification.attempts,
            notification.last_error.as_deref().unwrap_or("<none>")
        ));
    }
    lines.join("\n")
}
