use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use casetrack_core::domain::complaint::ComplaintId;
use casetrack_core::domain::directory::UserId;
use casetrack_core::domain::notification::{
    Channel, DeliveryStatus, Notification, NotificationId,
};
use casetrack_core::store::{NotificationStore, StoreError};

use super::{
    db_error, format_timestamp, parse_enum, parse_optional_timestamp, parse_timestamp, parse_u32,
    RepositoryError,
};
use crate::DbPool;

const NOTIFICATION_COLUMNS: &str = "id, user_id, complaint_id, sequence, channel, destination,
    body, status, attempts, next_attempt_at, last_error, created_at, sent_at";

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for SqlNotificationRepository {
    async fn enqueue(&self, notifications: Vec<Notification>) -> Result<Vec<Notification>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut inserted = Vec::with_capacity(notifications.len());

        for notification in notifications {
            let result = sqlx::query(
                "INSERT INTO notification (
                    id,
                    user_id,
                    complaint_id,
                    sequence,
                    channel,
                    destination,
                    body,
                    status,
                    attempts,
                    next_attempt_at,
                    last_error,
                    created_at,
                    sent_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(complaint_id, sequence, user_id, channel) DO NOTHING",
            )
            .bind(&notification.id.0)
            .bind(&notification.user_id.0)
            .bind(&notification.complaint_id.0)
            .bind(i64::from(notification.sequence))
            .bind(notification.channel.as_str())
            .bind(&notification.destination)
            .bind(&notification.body)
            .bind(notification.status.as_str())
            .bind(i64::from(notification.attempts))
            .bind(format_timestamp(notification.next_attempt_at))
            .bind(notification.last_error.as_deref())
            .bind(format_timestamp(notification.created_at))
            .bind(notification.sent_at.map(format_timestamp))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            if result.rows_affected() > 0 {
                inserted.push(notification);
            }
        }

        tx.commit().await.map_err(db_error)?;
        Ok(inserted)
    }

    async fn find_by_id(&self, id: &NotificationId) -> Result<Option<Notification>, StoreError> {
        let row =
            sqlx::query(&format!("SELECT {NOTIFICATION_COLUMNS} FROM notification WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(row.map(notification_from_row).transpose()?)
    }

    async fn pending_lane_heads(&self, limit: u32) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS}
             FROM notification AS n
             WHERE n.status = 'pending'
               AND NOT EXISTS (
                   SELECT 1 FROM notification AS earlier
                   WHERE earlier.status = 'pending'
                     AND earlier.user_id = n.user_id
                     AND earlier.complaint_id = n.complaint_id
                     AND (earlier.sequence < n.sequence
                          OR (earlier.sequence = n.sequence AND earlier.channel < n.channel))
               )
             ORDER BY n.next_attempt_at ASC, n.created_at ASC
             LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(notification_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_by_status(
        &self,
        status: DeliveryStatus,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS}
             FROM notification
             WHERE status = ?
             ORDER BY created_at DESC, id ASC
             LIMIT ?"
        ))
        .bind(status.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(notification_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_for_complaint(&self, id: &ComplaintId) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS}
             FROM notification
             WHERE complaint_id = ?
             ORDER BY sequence ASC, user_id ASC, channel ASC"
        ))
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(notification_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn update(&self, notification: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE notification SET
                status = ?,
                attempts = ?,
                next_attempt_at = ?,
                last_error = ?,
                sent_at = ?
             WHERE id = ?",
        )
        .bind(notification.status.as_str())
        .bind(i64::from(notification.attempts))
        .bind(format_timestamp(notification.next_attempt_at))
        .bind(notification.last_error.as_deref())
        .bind(notification.sent_at.map(format_timestamp))
        .bind(&notification.id.0)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}

fn notification_from_row(row: SqliteRow) -> Result<Notification, RepositoryError> {
    Ok(Notification {
        id: NotificationId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        complaint_id: ComplaintId(row.try_get("complaint_id")?),
        sequence: parse_u32("sequence", row.try_get("sequence")?)?,
        channel: parse_enum("channel", row.try_get("channel")?, Channel::parse)?,
        destination: row.try_get("destination")?,
        body: row.try_get("body")?,
        status: parse_enum("status", row.try_get("status")?, DeliveryStatus::parse)?,
        attempts: parse_u32("attempts", row.try_get("attempts")?)?,
        next_attempt_at: parse_timestamp("next_attempt_at", row.try_get("next_attempt_at")?)?,
        last_error: row.try_get("last_error")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        sent_at: parse_optional_timestamp("sent_at", row.try_get("sent_at")?)?,
    })
}
