use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use casetrack_core::domain::directory::{
    Department, DepartmentId, NatureType, NatureTypeId, Role, User, UserId,
};
use casetrack_core::store::{DirectoryStore, StoreError};

use super::{db_error, parse_bool, parse_enum, RepositoryError};
use crate::DbPool;

/// Users, departments and nature types. Owned by an external administration surface;
/// the workflow only reads them, upserts exist for seeding and tests.
pub struct SqlDirectoryRepository {
    pool: DbPool,
}

impl SqlDirectoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryStore for SqlDirectoryRepository {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, role, department_id, email, phone, is_active
             FROM app_user
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(user_from_row).transpose()?)
    }

    async fn find_department(&self, id: &DepartmentId) -> Result<Option<Department>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, manager_id, default_assignee_id, is_active
             FROM department
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(department_from_row).transpose()?)
    }

    async fn find_nature_type(&self, id: &NatureTypeId) -> Result<Option<NatureType>, StoreError> {
        let row = sqlx::query("SELECT id, name, is_active FROM nature_type WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.map(nature_type_from_row).transpose()?)
    }

    async fn save_user(&self, user: User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO app_user (id, name, role, department_id, email, phone, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                role = excluded.role,
                department_id = excluded.department_id,
                email = excluded.email,
                phone = excluded.phone,
                is_active = excluded.is_active",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.department_id.as_ref().map(|id| id.0.as_str()))
        .bind(user.email.as_deref())
        .bind(user.phone.as_deref())
        .bind(i64::from(user.is_active))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn save_department(&self, department: Department) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO department (id, name, manager_id, default_assignee_id, is_active)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                manager_id = excluded.manager_id,
                default_assignee_id = excluded.default_assignee_id,
                is_active = excluded.is_active",
        )
        .bind(&department.id.0)
        .bind(&department.name)
        .bind(department.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(department.default_assignee_id.as_ref().map(|id| id.0.as_str()))
        .bind(i64::from(department.is_active))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn save_nature_type(&self, nature_type: NatureType) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO nature_type (id, name, is_active)
             VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                is_active = excluded.is_active",
        )
        .bind(&nature_type.id.0)
        .bind(&nature_type.name)
        .bind(i64::from(nature_type.is_active))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}

fn user_from_row(row: SqliteRow) -> Result<User, RepositoryError> {
    Ok(User {
        id: UserId(row.try_get("id")?),
        name: row.try_get("name")?,
        role: parse_enum("role", row.try_get("role")?, Role::parse)?,
        department_id: row.try_get::<Option<String>, _>("department_id")?.map(DepartmentId),
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        is_active: parse_bool("is_active", row.try_get("is_active")?)?,
    })
}

fn department_from_row(row: SqliteRow) -> Result<Department, RepositoryError> {
    Ok(Department {
        id: DepartmentId(row.try_get("id")?),
        name: row.try_get("name")?,
        manager_id: row.try_get::<Option<String>, _>("manager_id")?.map(UserId),
        default_assignee_id: row.try_get::<Option<String>, _>("default_assignee_id")?.map(UserId),
        is_active: parse_bool("is_active", row.try_get("is_active")?)?,
    })
}

fn nature_type_from_row(row: SqliteRow) -> Result<NatureType, RepositoryError> {
    Ok(NatureType {
        id: NatureTypeId(row.try_get("id")?),
        name: row.try_get("name")?,
        is_active: parse_bool("is_active", row.try_get("is_active")?)?,
    })
}
