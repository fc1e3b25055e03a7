use casetrack_core::chrono::{DateTime, SecondsFormat, Utc};
use casetrack_core::store::StoreError;
use thiserror::Error;

pub mod complaint;
pub mod directory;
pub mod memory;
pub mod notification;
pub mod settings;

pub use complaint::SqlComplaintRepository;
pub use directory::SqlDirectoryRepository;
pub use memory::{
    InMemoryComplaintRepository, InMemoryDirectoryRepository, InMemoryNotificationRepository,
    InMemorySettingsRepository,
};
pub use notification::SqlNotificationRepository;
pub use settings::SqlSettingsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Decode(message) => StoreError::Decode(message),
            RepositoryError::Database(sqlx::Error::Database(db))
                if db.is_unique_violation() =>
            {
                StoreError::Duplicate(db.message().to_string())
            }
            RepositoryError::Database(other) => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(error: serde_json::Error) -> Self {
        RepositoryError::Decode(error.to_string())
    }
}

/// Fixed-width RFC3339 so text ordering matches time ordering.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn db_error(error: sqlx::Error) -> StoreError {
    RepositoryError::from(error).into()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_bool(column: &str, value: i64) -> Result<bool, RepositoryError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected 0 or 1): {other}"
        ))),
    }
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

/// Enum columns are stored as their `as_str` encoding.
pub(crate) fn parse_enum<T>(
    column: &str,
    value: String,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    parse(&value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown value in `{column}`: `{value}`")))
}
