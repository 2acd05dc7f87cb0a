use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// A study owns every upload, analysis and file submitted under its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    pub study_id: String,
    pub name: Option<String>,
    pub organization: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub info: Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Study {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Study {
            study_id: row.try_get("study_id")?,
            name: row.try_get("name")?,
            organization: row.try_get("organization")?,
            description: row.try_get("description")?,
            info: row
                .try_get::<Option<Value>, _>("info")?
                .unwrap_or(Value::Null),
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Request DTO for registering a study
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudyRequest {
    #[validate(length(
        min = 1,
        max = 64,
        message = "Study id must be between 1 and 64 characters"
    ))]
    pub study_id: String,
    #[serde(default)]
    #[validate(length(max = 255, message = "Name must be at most 255 characters"))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 255, message = "Organization must be at most 255 characters"))]
    pub organization: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub info: Value,
}
