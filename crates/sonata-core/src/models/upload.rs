use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::analysis_type::AnalysisTypeKey;

/// Lifecycle of an upload record.
///
/// `CREATED`/`UPDATED` are pending validation, `VALIDATED` may be saved,
/// `VALIDATION_ERROR` carries its messages in [`UploadRecord::errors`], and
/// `SAVED` means the analysis graph was persisted. Re-ingesting any existing
/// record (including a saved one) moves it back to `UPDATED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadState {
    Created,
    Updated,
    Validated,
    ValidationError,
    Saved,
}

impl UploadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Created => "CREATED",
            UploadState::Updated => "UPDATED",
            UploadState::Validated => "VALIDATED",
            UploadState::ValidationError => "VALIDATION_ERROR",
            UploadState::Saved => "SAVED",
        }
    }

    /// States from which `save` is allowed.
    pub fn is_saveable(&self) -> bool {
        matches!(self, UploadState::Validated | UploadState::Saved)
    }

    /// States still waiting for a validation verdict.
    pub fn is_pending(&self) -> bool {
        matches!(self, UploadState::Created | UploadState::Updated)
    }
}

impl Display for UploadState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(UploadState::Created),
            "UPDATED" => Ok(UploadState::Updated),
            "VALIDATED" => Ok(UploadState::Validated),
            "VALIDATION_ERROR" => Ok(UploadState::ValidationError),
            "SAVED" => Ok(UploadState::Saved),
            _ => Err(anyhow::anyhow!("Invalid upload state: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub upload_id: String,
    pub study_id: String,
    pub analysis_id: Option<String>,
    pub state: UploadState,
    /// Raw submitted JSON, kept verbatim.
    pub payload: String,
    pub replaced_payload: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Analysis type version the current payload passed validation against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_type: Option<AnalysisTypeKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn new(
        upload_id: String,
        study_id: String,
        analysis_id: Option<String>,
        payload: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            upload_id,
            study_id,
            analysis_id,
            state: UploadState::Created,
            payload,
            replaced_payload: None,
            errors: Vec::new(),
            validated_type: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-ingestion: keep the identity, swap the payload and restart validation.
    pub fn replace_payload(&mut self, payload: String) {
        let previous = std::mem::replace(&mut self.payload, payload);
        self.replaced_payload = Some(previous);
        self.state = UploadState::Updated;
        self.errors.clear();
        self.validated_type = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for UploadRecord {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(UploadRecord {
            upload_id: row.try_get("upload_id")?,
            study_id: row.try_get("study_id")?,
            analysis_id: row.try_get("analysis_id")?,
            state: row.try_get::<String, _>("state")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse upload state: {}", e).into())
            })?,
            payload: row.try_get("payload")?,
            replaced_payload: row.try_get("replaced_payload")?,
            errors: row
                .try_get::<Option<sqlx::types::Json<Vec<String>>>, _>("errors")?
                .map(|errors| errors.0)
                .unwrap_or_default(),
            validated_type: match (
                row.try_get::<Option<String>, _>("validated_type_name")?,
                row.try_get::<Option<i32>, _>("validated_type_version")?,
            ) {
                (Some(name), Some(version)) => Some(AnalysisTypeKey { name, version }),
                _ => None,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Reply of an ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub upload_id: String,
    pub status: String,
    /// The payload this ingestion overwrote, when the business key already existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced: Option<String>,
    /// State right after ingestion; only final in synchronous validation mode.
    pub state: UploadState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Reply of a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub analysis_id: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_text() {
        for state in [
            UploadState::Created,
            UploadState::Updated,
            UploadState::Validated,
            UploadState::ValidationError,
            UploadState::Saved,
        ] {
            assert_eq!(state.as_str().parse::<UploadState>().unwrap(), state);
        }
        assert!("DONE".parse::<UploadState>().is_err());
    }

    #[test]
    fn test_only_validated_or_saved_are_saveable() {
        assert!(UploadState::Validated.is_saveable());
        assert!(UploadState::Saved.is_saveable());
        assert!(!UploadState::Created.is_saveable());
        assert!(!UploadState::Updated.is_saveable());
        assert!(!UploadState::ValidationError.is_saveable());
    }

    #[test]
    fn test_replace_payload_resets_validation() {
        let mut record = UploadRecord::new(
            "UP1".to_string(),
            "ABC123".to_string(),
            Some("AN1".to_string()),
            "{\"v\":1}".to_string(),
        );
        record.state = UploadState::ValidationError;
        record.errors.push("bad".to_string());
        record.validated_type = Some(AnalysisTypeKey {
            name: "variantCall".to_string(),
            version: 1,
        });

        record.replace_payload("{\"v\":2}".to_string());

        assert_eq!(record.state, UploadState::Updated);
        assert_eq!(record.payload, "{\"v\":2}");
        assert_eq!(record.replaced_payload.as_deref(), Some("{\"v\":1}"));
        assert!(record.errors.is_empty());
        assert_eq!(record.validated_type, None);
    }
}
