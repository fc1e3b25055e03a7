use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use casetrack_core::domain::complaint::{Attachment, Complaint, ComplaintId, ComplaintStatus};
use casetrack_core::domain::directory::{DepartmentId, NatureTypeId, UserId};
use casetrack_core::domain::history::{HistoryEntry, HistoryEntryId};
use casetrack_core::store::{ComplaintFilter, ComplaintStore, RoutingStats, StoreError};

use super::{
    db_error, format_timestamp, parse_enum, parse_timestamp, parse_u32, RepositoryError,
};
use crate::DbPool;

const COMPLAINT_COLUMNS: &str = "id, client_id, title, description, error_type, error_screen,
    nature_type_id, remark, status, department_id, current_assignee_id, first_assignee_id,
    auto_routed, attachments_json, version, created_at, updated_at";

pub struct SqlComplaintRepository {
    pool: DbPool,
}

impl SqlComplaintRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ComplaintStore for SqlComplaintRepository {
    async fn insert(&self, complaint: &Complaint, entry: &HistoryEntry) -> Result<(), StoreError> {
        let attachments = serde_json::to_string(&complaint.attachments)
            .map_err(|error| StoreError::Decode(error.to_string()))?;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            "INSERT INTO complaint (
                id,
                client_id,
                title,
                description,
                error_type,
                error_screen,
                nature_type_id,
                remark,
                status,
                department_id,
                current_assignee_id,
                first_assignee_id,
                auto_routed,
                attachments_json,
                version,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&complaint.id.0)
        .bind(&complaint.client_id.0)
        .bind(&complaint.title)
        .bind(&complaint.description)
        .bind(complaint.error_type.as_deref())
        .bind(complaint.error_screen.as_deref())
        .bind(&complaint.nature_type_id.0)
        .bind(complaint.remark.as_deref())
        .bind(complaint.status.as_str())
        .bind(&complaint.department_id.0)
        .bind(&complaint.current_assignee_id.0)
        .bind(&complaint.first_assignee_id.0)
        .bind(complaint.auto_routed)
        .bind(attachments)
        .bind(i64::from(complaint.version))
        .bind(format_timestamp(complaint.created_at))
        .bind(format_timestamp(complaint.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        insert_history(&mut tx, entry).await?;
        tx.commit().await.map_err(db_error)
    }

    async fn find_by_id(&self, id: &ComplaintId) -> Result<Option<Complaint>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COMPLAINT_COLUMNS} FROM complaint WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.map(complaint_from_row).transpose()?)
    }

    async fn commit_transition(
        &self,
        expected_version: u32,
        complaint: &Complaint,
        entry: &HistoryEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Only fields a transition may touch; the rest of the row is immutable.
        let updated = sqlx::query(
            "UPDATE complaint SET
                status = ?,
                department_id = ?,
                current_assignee_id = ?,
                version = ?,
                updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(complaint.status.as_str())
        .bind(&complaint.department_id.0)
        .bind(&complaint.current_assignee_id.0)
        .bind(i64::from(complaint.version))
        .bind(format_timestamp(complaint.updated_at))
        .bind(&complaint.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(db_error)?;
            return Err(StoreError::Conflict {
                complaint_id: complaint.id.clone(),
                expected_version,
            });
        }

        insert_history(&mut tx, entry).await?;
        tx.commit().await.map_err(db_error)
    }

    async fn list_history(&self, id: &ComplaintId) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT
                id,
                complaint_id,
                sequence,
                status,
                assigned_from,
                assigned_to,
                department_id,
                actor_id,
                notes,
                recorded_at
             FROM complaint_history
             WHERE complaint_id = ?
             ORDER BY recorded_at DESC, sequence DESC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(history_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn query(&self, filter: &ComplaintFilter) -> Result<Vec<Complaint>, StoreError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {COMPLAINT_COLUMNS} FROM complaint WHERE 1 = 1"));
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(client_id) = &filter.client_id {
            builder.push(" AND client_id = ").push_bind(client_id.0.clone());
        }
        if let Some(department_id) = &filter.department_id {
            builder.push(" AND department_id = ").push_bind(department_id.0.clone());
        }
        if let Some(assignee_id) = &filter.current_assignee_id {
            builder.push(" AND current_assignee_id = ").push_bind(assignee_id.0.clone());
        }
        builder.push(" ORDER BY created_at DESC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await.map_err(db_error)?;
        Ok(rows.into_iter().map(complaint_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn routing_stats(&self) -> Result<RoutingStats, StoreError> {
        let (total, auto_routed): (i64, i64) = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(auto_routed), 0) AS auto_routed FROM complaint",
        )
        .fetch_one(&self.pool)
        .await
        .and_then(|row| Ok((row.try_get("total")?, row.try_get("auto_routed")?)))
        .map_err(db_error)?;

        let rows = sqlx::query(
            "SELECT department_id, COUNT(*) AS open_count
             FROM complaint
             WHERE status NOT IN ('done', 'closed')
             GROUP BY department_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut stats = RoutingStats {
            total_complaints: u64::try_from(total).unwrap_or(0),
            auto_routed_complaints: u64::try_from(auto_routed).unwrap_or(0),
            ..RoutingStats::default()
        };
        for row in rows {
            let department_id: String = row.try_get("department_id").map_err(db_error)?;
            let open: i64 = row.try_get("open_count").map_err(db_error)?;
            stats.open_by_department.insert(DepartmentId(department_id), u64::try_from(open).unwrap_or(0));
        }
        Ok(stats)
    }
}

async fn insert_history(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    entry: &HistoryEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO complaint_history (
            id,
            complaint_id,
            sequence,
            status,
            assigned_from,
            assigned_to,
            department_id,
            actor_id,
            notes,
            recorded_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id.0)
    .bind(&entry.complaint_id.0)
    .bind(i64::from(entry.sequence))
    .bind(entry.status.as_str())
    .bind(entry.assigned_from.as_ref().map(|id| id.0.as_str()))
    .bind(entry.assigned_to.as_ref().map(|id| id.0.as_str()))
    .bind(&entry.department_id.0)
    .bind(&entry.actor_id.0)
    .bind(entry.notes.as_deref())
    .bind(format_timestamp(entry.recorded_at))
    .execute(&mut **tx)
    .await
    .map_err(db_error)?;
    Ok(())
}

fn complaint_from_row(row: SqliteRow) -> Result<Complaint, RepositoryError> {
    let attachments_json = row.try_get::<String, _>("attachments_json")?;
    let attachments: Vec<Attachment> = serde_json::from_str(&attachments_json)?;

    Ok(Complaint {
        id: ComplaintId(row.try_get("id")?),
        client_id: UserId(row.try_get("client_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        error_type: row.try_get("error_type")?,
        error_screen: row.try_get("error_screen")?,
        nature_type_id: NatureTypeId(row.try_get("nature_type_id")?),
        remark: row.try_get("remark")?,
        status: parse_enum("status", row.try_get("status")?, ComplaintStatus::parse)?,
        department_id: DepartmentId(row.try_get("department_id")?),
        current_assignee_id: UserId(row.try_get("current_assignee_id")?),
        first_assignee_id: UserId(row.try_get("first_assignee_id")?),
        auto_routed: row.try_get("auto_routed")?,
        attachments,
        version: parse_u32("version", row.try_get("version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn history_from_row(row: SqliteRow) -> Result<HistoryEntry, RepositoryError> {
    Ok(HistoryEntry {
        id: HistoryEntryId(row.try_get("id")?),
        complaint_id: ComplaintId(row.try_get("complaint_id")?),
        sequence: parse_u32("sequence", row.try_get("sequence")?)?,
        status: parse_enum("status", row.try_get("status")?, ComplaintStatus::parse)?,
        assigned_from: row.try_get::<Option<String>, _>("assigned_from")?.map(UserId),
        assigned_to: row.try_get::<Option<String>, _>("assigned_to")?.map(UserId),
        department_id: DepartmentId(row.try_get("department_id")?),
        actor_id: UserId(row.try_get("actor_id")?),
        notes: row.try_get("notes")?,
        recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use casetrack_core::audit::AuditTrailRecorder;
    use casetrack_core::chrono::{DateTime, Utc};
    use casetrack_core::domain::complaint::{
        Attachment, Complaint, ComplaintId, ComplaintStatus,
    };
    use casetrack_core::domain::directory::{DepartmentId, NatureTypeId, UserId};
    use casetrack_core::store::{ComplaintFilter, ComplaintStore, StoreError};

    use super::SqlComplaintRepository;
    use crate::migrations;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_complaint_repo_round_trip_with_history() {
        let repo = SqlComplaintRepository::new(setup_pool().await);
        let complaint = sample_complaint("C-REL-001", "support");
        let entry = AuditTrailRecorder.record_for(None, &complaint, &UserId("client-a".to_string()), None);

        repo.insert(&complaint, &entry).await.expect("insert");

        let found = repo.find_by_id(&complaint.id).await.expect("find");
        assert_eq!(found, Some(complaint.clone()));
        assert_eq!(repo.list_history(&complaint.id).await.expect("history"), vec![entry]);
    }

    #[tokio::test]
    async fn stale_version_commit_is_rejected_without_writing() {
        let repo = SqlComplaintRepository::new(setup_pool().await);
        let complaint = sample_complaint("C-REL-002", "support");
        let actor = UserId("mgr".to_string());
        repo.insert(&complaint, &AuditTrailRecorder.record_for(None, &complaint, &actor, None))
            .await
            .expect("insert");

        let mut next = complaint.clone();
        next.status = ComplaintStatus::Assigned;
        next.version = 2;
        let entry = AuditTrailRecorder.record_for(Some(&complaint.current_assignee_id), &next, &actor, None);
        repo.commit_transition(1, &next, &entry).await.expect("first commit");

        let mut stale = complaint.clone();
        stale.current_assignee_id = UserId("e9".to_string());
        stale.version = 2;
        let stale_entry =
            AuditTrailRecorder.record_for(Some(&complaint.current_assignee_id), &stale, &actor, None);
        let result = repo.commit_transition(1, &stale, &stale_entry).await;

        assert!(matches!(result, Err(StoreError::Conflict { expected_version: 1, .. })));
        let stored = repo.find_by_id(&complaint.id).await.expect("find").expect("present");
        assert_eq!(stored.status, ComplaintStatus::Assigned);
        assert_eq!(stored.current_assignee_id, complaint.current_assignee_id);
        assert_eq!(repo.list_history(&complaint.id).await.expect("history").len(), 2);
    }

    #[tokio::test]
    async fn query_and_routing_stats_use_indexed_columns() {
        let repo = SqlComplaintRepository::new(setup_pool().await);
        let actor = UserId("client-a".to_string());
        for (id, department, status, auto_routed) in [
            ("C-1", "support", ComplaintStatus::New, true),
            ("C-2", "support", ComplaintStatus::Done, false),
            ("C-3", "billing", ComplaintStatus::InProgress, true),
        ] {
            let mut complaint = sample_complaint(id, department);
            complaint.status = status;
            complaint.auto_routed = auto_routed;
            repo.insert(&complaint, &AuditTrailRecorder.record_for(None, &complaint, &actor, None))
                .await
                .expect("insert");
        }

        let support = repo
            .query(&ComplaintFilter {
                department_id: Some(DepartmentId("support".to_string())),
                ..ComplaintFilter::default()
            })
            .await
            .expect("query");
        assert_eq!(support.len(), 2);

        let stats = repo.routing_stats().await.expect("stats");
        assert_eq!(stats.total_complaints, 3);
        assert_eq!(stats.auto_routed_complaints, 2);
        assert_eq!(stats.open_by_department.get(&DepartmentId("support".to_string())), Some(&1));
        assert_eq!(stats.open_by_department.get(&DepartmentId("billing".to_string())), Some(&1));
    }

    #[tokio::test]
    async fn history_rows_cannot_be_rewritten() {
        let pool = setup_pool().await;
        let repo = SqlComplaintRepository::new(pool.clone());
        let complaint = sample_complaint("C-REL-003", "support");
        repo.insert(
            &complaint,
            &AuditTrailRecorder.record_for(None, &complaint, &UserId("client-a".to_string()), None),
        )
        .await
        .expect("insert");

        let update = sqlx::query("UPDATE complaint_history SET notes = 'edited'").execute(&pool).await;
        let delete = sqlx::query("DELETE FROM complaint_history").execute(&pool).await;

        assert!(update.is_err());
        assert!(delete.is_err());
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_complaint(id: &str, department: &str) -> Complaint {
        Complaint {
            id: ComplaintId(id.to_string()),
            client_id: UserId("client-a".to_string()),
            title: "Export fails".to_string(),
            description: "CSV export returns 500".to_string(),
            error_type: Some("server".to_string()),
            error_screen: None,
            nature_type_id: NatureTypeId("bug".to_string()),
            remark: None,
            status: ComplaintStatus::New,
            department_id: DepartmentId(department.to_string()),
            current_assignee_id: UserId("e1".to_string()),
            first_assignee_id: UserId("e1".to_string()),
            auto_routed: false,
            attachments: vec![Attachment {
                url: "https://files.example/shot.png".to_string(),
                file_name: "shot.png".to_string(),
                content_type: Some("image/png".to_string()),
                size_bytes: Some(2048),
            }],
            version: 1,
            created_at: parse_ts("2026-02-23T12:00:00.123456789Z"),
            updated_at: parse_ts("2026-02-23T12:00:00.123456789Z"),
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
