use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::analysis_type::{AnalysisTypeKey, AnalysisTypeRef};
use super::file::AccessType;

/// Publication state of an analysis. File content may only change while `UNPUBLISHED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisState {
    Unpublished,
    Published,
    Suppressed,
}

impl AnalysisState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisState::Unpublished => "UNPUBLISHED",
            AnalysisState::Published => "PUBLISHED",
            AnalysisState::Suppressed => "SUPPRESSED",
        }
    }
}

impl Display for AnalysisState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNPUBLISHED" => Ok(AnalysisState::Unpublished),
            "PUBLISHED" => Ok(AnalysisState::Published),
            "SUPPRESSED" => Ok(AnalysisState::Suppressed),
            _ => Err(anyhow::anyhow!("Invalid analysis state: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub analysis_id: String,
    pub study_id: String,
    pub analysis_type: AnalysisTypeKey,
    pub analysis_state: AnalysisState,
    #[serde(default)]
    pub info: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
fn info_column(row: &sqlx::postgres::PgRow) -> Result<Value, sqlx::Error> {
    use sqlx::Row;
    Ok(row
        .try_get::<Option<Value>, _>("info")?
        .unwrap_or(Value::Null))
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Analysis {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Analysis {
            analysis_id: row.try_get("analysis_id")?,
            study_id: row.try_get("study_id")?,
            analysis_type: AnalysisTypeKey {
                name: row.try_get("analysis_type_name")?,
                version: row.try_get("analysis_type_version")?,
            },
            analysis_state: row
                .try_get::<String, _>("analysis_state")?
                .parse()
                .map_err(|e| {
                    sqlx::Error::Decode(format!("Failed to parse analysis state: {}", e).into())
                })?,
            info: info_column(row)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Donor {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Donor {
            donor_id: row.try_get("donor_id")?,
            study_id: row.try_get("study_id")?,
            submitter_donor_id: row.try_get("submitter_donor_id")?,
            gender: row.try_get("gender")?,
            info: info_column(row)?,
        })
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Specimen {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Specimen {
            specimen_id: row.try_get("specimen_id")?,
            donor_id: row.try_get("donor_id")?,
            study_id: row.try_get("study_id")?,
            submitter_specimen_id: row.try_get("submitter_specimen_id")?,
            specimen_type: row.try_get("specimen_type")?,
            tissue_source: row.try_get("tissue_source")?,
            info: info_column(row)?,
        })
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Sample {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Sample {
            sample_id: row.try_get("sample_id")?,
            specimen_id: row.try_get("specimen_id")?,
            study_id: row.try_get("study_id")?,
            submitter_sample_id: row.try_get("submitter_sample_id")?,
            sample_type: row.try_get("sample_type")?,
            info: info_column(row)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donor {
    pub donor_id: String,
    pub study_id: String,
    pub submitter_donor_id: String,
    pub gender: String,
    #[serde(default)]
    pub info: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specimen {
    pub specimen_id: String,
    pub donor_id: String,
    pub study_id: String,
    pub submitter_specimen_id: String,
    pub specimen_type: String,
    pub tissue_source: Option<String>,
    #[serde(default)]
    pub info: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub sample_id: String,
    pub specimen_id: String,
    pub study_id: String,
    pub submitter_sample_id: String,
    pub sample_type: String,
    #[serde(default)]
    pub info: Value,
}

/// The analysis document carried by an upload, as submitted.
///
/// Fields outside the recognised shape are kept in `info` so nothing the
/// submitter sent is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    #[serde(default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub study_id: Option<String>,
    pub analysis_type: AnalysisTypeRef,
    pub samples: Vec<SamplePayload>,
    pub files: Vec<FilePayload>,
    #[serde(flatten)]
    pub info: Map<String, Value>,
}

impl AnalysisPayload {
    /// The submitter-chosen analysis id, ignoring blanks.
    pub fn requested_analysis_id(&self) -> Option<&str> {
        self.analysis_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplePayload {
    pub submitter_sample_id: String,
    pub sample_type: String,
    pub specimen: SpecimenPayload,
    pub donor: DonorPayload,
    #[serde(default)]
    pub info: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecimenPayload {
    pub submitter_specimen_id: String,
    pub specimen_type: String,
    #[serde(default)]
    pub tissue_source: Option<String>,
    #[serde(default)]
    pub info: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorPayload {
    pub submitter_donor_id: String,
    pub gender: String,
    #[serde(default)]
    pub info: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
    pub file_name: String,
    pub file_size: i64,
    pub file_md5sum: String,
    pub file_type: String,
    pub file_access: AccessType,
    #[serde(default)]
    pub info: Value,
}

/// Reply of a publication state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStateChange {
    pub analysis_id: String,
    pub previous_state: AnalysisState,
    pub analysis_state: AnalysisState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_keeps_unknown_fields_in_info() {
        let payload: AnalysisPayload = serde_json::from_value(json!({
            "analysisId": "AN1",
            "studyId": "ABC123",
            "analysisType": "variantCall",
            "experiment": {"platform": "ILLUMINA"},
            "samples": [{
                "submitterSampleId": "sa-1",
                "sampleType": "DNA",
                "specimen": {"submitterSpecimenId": "sp-1", "specimenType": "Normal"},
                "donor": {"submitterDonorId": "do-1", "gender": "female"}
            }],
            "files": [{
                "fileName": "a.bam",
                "fileSize": 12,
                "fileMd5sum": "0123456789abcdef0123456789abcdef",
                "fileType": "BAM",
                "fileAccess": "open"
            }]
        }))
        .unwrap();

        assert_eq!(payload.requested_analysis_id(), Some("AN1"));
        assert_eq!(payload.analysis_type.name(), "variantCall");
        assert_eq!(payload.samples.len(), 1);
        assert_eq!(payload.files[0].file_access, AccessType::Open);
        assert_eq!(
            payload.info.get("experiment"),
            Some(&json!({"platform": "ILLUMINA"}))
        );
    }

    #[test]
    fn test_blank_analysis_id_is_absent() {
        let payload: AnalysisPayload = serde_json::from_value(json!({
            "analysisId": "  ",
            "analysisType": "variantCall",
            "samples": [],
            "files": []
        }))
        .unwrap();
        assert_eq!(payload.requested_analysis_id(), None);
    }

    #[test]
    fn test_analysis_state_text() {
        assert_eq!(
            "SUPPRESSED".parse::<AnalysisState>().unwrap(),
            AnalysisState::Suppressed
        );
        assert_eq!(AnalysisState::Unpublished.to_string(), "UNPUBLISHED");
        assert!("published".parse::<AnalysisState>().is_err());
    }
}
