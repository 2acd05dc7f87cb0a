use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use validator::Validate;

use super::analysis::AnalysisState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Open,
    Controlled,
}

impl AccessType {
    pub const ALL: [AccessType; 2] = [AccessType::Open, AccessType::Controlled];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Open => "open",
            AccessType::Controlled => "controlled",
        }
    }
}

impl Display for AccessType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(AccessType::Open),
            "controlled" => Ok(AccessType::Controlled),
            _ => Err(anyhow::anyhow!("Invalid file access: {}", s)),
        }
    }
}

/// A persisted file belonging to one analysis of one study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub object_id: String,
    pub analysis_id: String,
    pub study_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_md5sum: String,
    pub file_access: AccessType,
    pub file_type: String,
    #[serde(default)]
    pub info: Value,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for FileRecord {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(FileRecord {
            object_id: row.try_get("object_id")?,
            analysis_id: row.try_get("analysis_id")?,
            study_id: row.try_get("study_id")?,
            file_name: row.try_get("file_name")?,
            file_size: row.try_get("file_size")?,
            file_md5sum: row.try_get("file_md5sum")?,
            file_access: row
                .try_get::<String, _>("file_access")?
                .parse()
                .map_err(|e| {
                    sqlx::Error::Decode(format!("Failed to parse file access: {}", e).into())
                })?,
            file_type: row.try_get("file_type")?,
            info: row
                .try_get::<Option<Value>, _>("info")?
                .unwrap_or(Value::Null),
        })
    }
}

/// Partial update of a file as submitted by a client.
///
/// A missing key means "leave unchanged". For the scalar fields an explicit
/// `null` is treated the same way, but `"info": null` is a real change that
/// clears the stored document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FileUpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "must be a positive integer"))]
    pub file_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "crate::validation::file_update::validate_md5sum"))]
    pub file_md5sum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "crate::validation::file_update::validate_access"))]
    pub file_access: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub info: Option<Value>,
}

/// Maps a present key to `Some`, even when its value is `null`.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A [`FileUpdateRequest`] whose shape has been checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileUpdate {
    pub file_size: Option<i64>,
    pub file_md5sum: Option<String>,
    pub file_access: Option<AccessType>,
    pub info: Option<Value>,
}

impl FileUpdate {
    pub fn is_empty(&self) -> bool {
        self.file_size.is_none()
            && self.file_md5sum.is_none()
            && self.file_access.is_none()
            && self.info.is_none()
    }

    /// Copy of `file` with every present field overwritten.
    pub fn apply_to(&self, file: &FileRecord) -> FileRecord {
        let mut updated = file.clone();
        if let Some(size) = self.file_size {
            updated.file_size = size;
        }
        if let Some(md5) = &self.file_md5sum {
            updated.file_md5sum = md5.clone();
        }
        if let Some(access) = self.file_access {
            updated.file_access = access;
        }
        if let Some(info) = &self.info {
            updated.info = info.clone();
        }
        updated
    }
}

/// How a request would change a stored file. Derived per request, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileUpdateType {
    NoUpdate,
    MetadataUpdate,
    ContentUpdate,
}

impl FileUpdateType {
    /// Content changes (size, checksum) win over metadata changes (access, info).
    pub fn classify(existing: &FileRecord, update: &FileUpdate) -> Self {
        let size_changed = update
            .file_size
            .is_some_and(|size| size != existing.file_size);
        let md5_changed = update
            .file_md5sum
            .as_deref()
            .is_some_and(|md5| md5 != existing.file_md5sum);
        if size_changed || md5_changed {
            return FileUpdateType::ContentUpdate;
        }

        let access_changed = update
            .file_access
            .is_some_and(|access| access != existing.file_access);
        let info_changed = update
            .info
            .as_ref()
            .is_some_and(|info| *info != existing.info);
        if access_changed || info_changed {
            return FileUpdateType::MetadataUpdate;
        }

        FileUpdateType::NoUpdate
    }

    /// Whether a change of this kind is allowed against an analysis in `state`.
    pub fn is_permitted_in(&self, state: AnalysisState) -> bool {
        match self {
            FileUpdateType::ContentUpdate => state == AnalysisState::Unpublished,
            FileUpdateType::MetadataUpdate | FileUpdateType::NoUpdate => true,
        }
    }
}

impl Display for FileUpdateType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileUpdateType::NoUpdate => write!(f, "NO_UPDATE"),
            FileUpdateType::MetadataUpdate => write!(f, "METADATA_UPDATE"),
            FileUpdateType::ContentUpdate => write!(f, "CONTENT_UPDATE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpdateResponse {
    pub file_update_type: FileUpdateType,
    pub original_file: FileRecord,
    pub original_analysis_state: AnalysisState,
    pub unpublished_analysis: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reference_file() -> FileRecord {
        FileRecord {
            object_id: "FI1".to_string(),
            analysis_id: "AN1".to_string(),
            study_id: "ABC123".to_string(),
            file_name: "myFilename.bam".to_string(),
            file_size: 777777,
            file_md5sum: "a3bc0998a3bc0998a3bc0998a3bc0998".to_string(),
            file_access: AccessType::Open,
            file_type: "BAM".to_string(),
            info: json!({"myInfoKey1": "myInfoValue1"}),
        }
    }

    #[test]
    fn test_empty_update_is_no_update() {
        let file = reference_file();
        assert_eq!(
            FileUpdateType::classify(&file, &FileUpdate::default()),
            FileUpdateType::NoUpdate
        );
    }

    #[test]
    fn test_unchanged_values_are_no_update() {
        let file = reference_file();
        let update = FileUpdate {
            file_size: Some(777777),
            file_md5sum: Some(file.file_md5sum.clone()),
            file_access: Some(AccessType::Open),
            info: Some(json!({"myInfoKey1": "myInfoValue1"})),
        };
        assert_eq!(FileUpdateType::classify(&file, &update), FileUpdateType::NoUpdate);
    }

    #[test]
    fn test_size_or_md5_change_is_content_update() {
        let file = reference_file();
        let size = FileUpdate {
            file_size: Some(777854),
            ..FileUpdate::default()
        };
        let md5 = FileUpdate {
            file_md5sum: Some("ffffffffffffffffffffffffffffffff".to_string()),
            ..FileUpdate::default()
        };
        assert_eq!(FileUpdateType::classify(&file, &size), FileUpdateType::ContentUpdate);
        assert_eq!(FileUpdateType::classify(&file, &md5), FileUpdateType::ContentUpdate);
    }

    #[test]
    fn test_access_or_info_change_is_metadata_update() {
        let file = reference_file();
        let access = FileUpdate {
            file_access: Some(AccessType::Controlled),
            ..FileUpdate::default()
        };
        let info = FileUpdate {
            info: Some(json!({"myInfoKey1": "other"})),
            ..FileUpdate::default()
        };
        let cleared = FileUpdate {
            info: Some(Value::Null),
            ..FileUpdate::default()
        };
        assert_eq!(FileUpdateType::classify(&file, &access), FileUpdateType::MetadataUpdate);
        assert_eq!(FileUpdateType::classify(&file, &info), FileUpdateType::MetadataUpdate);
        assert_eq!(FileUpdateType::classify(&file, &cleared), FileUpdateType::MetadataUpdate);
    }

    #[test]
    fn test_content_takes_precedence_over_metadata() {
        let file = reference_file();
        let update = FileUpdate {
            file_size: Some(1),
            file_access: Some(AccessType::Controlled),
            info: Some(json!({})),
            ..FileUpdate::default()
        };
        assert_eq!(FileUpdateType::classify(&file, &update), FileUpdateType::ContentUpdate);
    }

    #[test]
    fn test_info_compared_by_value() {
        let mut file = reference_file();
        file.info = json!({"a": 1, "b": {"c": [1, 2]}});
        let update = FileUpdate {
            info: Some(serde_json::from_str(r#"{"b": {"c": [1, 2]}, "a": 1}"#).unwrap()),
            ..FileUpdate::default()
        };
        assert_eq!(FileUpdateType::classify(&file, &update), FileUpdateType::NoUpdate);
    }

    #[test]
    fn test_permissions_by_state() {
        for state in [AnalysisState::Published, AnalysisState::Suppressed] {
            assert!(!FileUpdateType::ContentUpdate.is_permitted_in(state));
            assert!(FileUpdateType::MetadataUpdate.is_permitted_in(state));
            assert!(FileUpdateType::NoUpdate.is_permitted_in(state));
        }
        assert!(FileUpdateType::ContentUpdate.is_permitted_in(AnalysisState::Unpublished));
    }

    #[test]
    fn test_apply_only_touches_present_fields() {
        let file = reference_file();
        let update = FileUpdate {
            file_access: Some(AccessType::Controlled),
            info: Some(Value::Null),
            ..FileUpdate::default()
        };
        let updated = update.apply_to(&file);
        assert_eq!(updated.file_size, file.file_size);
        assert_eq!(updated.file_md5sum, file.file_md5sum);
        assert_eq!(updated.file_access, AccessType::Controlled);
        assert_eq!(updated.info, Value::Null);
    }

    #[test]
    fn test_request_distinguishes_null_info_from_absent() {
        let absent: FileUpdateRequest = serde_json::from_str(r#"{"fileSize": null}"#).unwrap();
        assert_eq!(absent.file_size, None);
        assert_eq!(absent.info, None);

        let cleared: FileUpdateRequest = serde_json::from_str(r#"{"info": null}"#).unwrap();
        assert_eq!(cleared.info, Some(Value::Null));
    }
}
