//! Schema validation of upload payloads.
//!
//! A verdict is only written if the upload still holds the payload that was
//! validated and is still waiting for a verdict, so a late background run can
//! never overwrite the outcome of a newer ingestion.

use serde_json::Value;
use sonata_core::models::{AnalysisTypeKey, AnalysisTypeRef, UploadRecord, UploadState};
use std::collections::BTreeSet;
use sonata_core::{AppError, ValidationMode};
use sonata_db::UploadRepository;
use std::sync::Arc;

use super::analysis_type::AnalysisTypeService;
use super::schema_validator::SchemaValidator;

/// The state an upload is left in after validation was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub state: UploadState,
    pub errors: Vec<String>,
}

/// Problems found in a payload, and the type version it was checked against.
#[derive(Debug, Default)]
struct Verdict {
    errors: Vec<String>,
    analysis_type: Option<AnalysisTypeKey>,
}

impl Verdict {
    fn rejected(errors: Vec<String>) -> Self {
        Self {
            errors,
            analysis_type: None,
        }
    }
}

#[derive(Clone)]
pub struct ValidationService {
    uploads: Arc<dyn UploadRepository>,
    analysis_types: AnalysisTypeService,
    validator: Arc<dyn SchemaValidator>,
    mode: ValidationMode,
}

impl ValidationService {
    pub fn new(
        uploads: Arc<dyn UploadRepository>,
        analysis_types: AnalysisTypeService,
        validator: Arc<dyn SchemaValidator>,
        mode: ValidationMode,
    ) -> Self {
        Self {
            uploads,
            analysis_types,
            validator,
            mode,
        }
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Validate `upload` now (sync mode) or in a background task (async mode).
    ///
    /// In async mode the returned outcome is the pending state the upload was
    /// stored with; callers poll the upload to see the verdict.
    pub async fn submit(&self, upload: &UploadRecord) -> Result<ValidationOutcome, AppError> {
        match self.mode {
            ValidationMode::Sync => self.run(upload).await,
            ValidationMode::Async => {
                let service = self.clone();
                let upload_id = upload.upload_id.clone();
                let snapshot = upload.clone();
                tokio::spawn(async move {
                    if let Err(e) = service.run(&snapshot).await {
                        tracing::error!(
                            upload_id = %snapshot.upload_id,
                            error = %e,
                            "Background validation failed"
                        );
                    }
                });
                tracing::debug!(upload_id = %upload_id, "Validation scheduled");
                Ok(ValidationOutcome {
                    state: upload.state,
                    errors: Vec::new(),
                })
            }
        }
    }

    /// Validate and record the verdict for the payload `upload` holds.
    #[tracing::instrument(skip(self, upload), fields(upload_id = %upload.upload_id))]
    pub async fn run(&self, upload: &UploadRecord) -> Result<ValidationOutcome, AppError> {
        let verdict = match self.evaluate(&upload.study_id, &upload.payload).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(error = %e, "Validation could not complete");
                Verdict::rejected(vec![e.to_string()])
            }
        };
        let Verdict {
            errors,
            analysis_type,
        } = verdict;
        let (state, validated_type) = if errors.is_empty() {
            (UploadState::Validated, analysis_type)
        } else {
            (UploadState::ValidationError, None)
        };

        let rows = self
            .uploads
            .record_validation(
                &upload.upload_id,
                &upload.payload,
                state,
                &errors,
                validated_type.as_ref(),
            )
            .await?;
        if rows == 0 {
            tracing::debug!(
                state = %state,
                "Upload changed during validation, verdict discarded"
            );
            let current = self
                .uploads
                .read(&upload.upload_id)
                .await?
                .ok_or_else(|| AppError::UploadIdNotFound(upload.upload_id.clone()))?;
            return Ok(ValidationOutcome {
                state: current.state,
                errors: current.errors,
            });
        }
        if errors.is_empty() {
            tracing::info!("Upload validated");
        } else {
            tracing::warn!(errors = errors.len(), "Upload failed validation");
        }

        Ok(ValidationOutcome { state, errors })
    }

    /// Problems with `payload`; no errors means valid. Infrastructure failures are errors.
    async fn evaluate(&self, study_id: &str, payload: &str) -> Result<Verdict, AppError> {
        let document: Value = match serde_json::from_str(payload) {
            Ok(document) => document,
            Err(e) => return Ok(Verdict::rejected(vec![format!("payload: {}", e)])),
        };

        let mut errors = Vec::new();
        if let Some(payload_study) = document.get("studyId").and_then(Value::as_str) {
            if payload_study != study_id {
                errors.push(format!(
                    "studyId: '{}' does not match the upload study '{}'",
                    payload_study, study_id
                ));
            }
        }

        let type_ref = match document.get("analysisType") {
            None | Some(Value::Null) => {
                errors.push("analysisType: missing".to_string());
                return Ok(Verdict::rejected(errors));
            }
            Some(raw) => match serde_json::from_value::<AnalysisTypeRef>(raw.clone()) {
                Ok(type_ref) if !type_ref.name().trim().is_empty() => type_ref,
                _ => {
                    errors.push("analysisType: must be a name or {name, version}".to_string());
                    return Ok(Verdict::rejected(errors));
                }
            },
        };

        let analysis_type = match self.analysis_types.resolve_ref(&type_ref, false).await {
            Ok(analysis_type) => analysis_type,
            Err(AppError::AnalysisTypeNotFound(key)) => {
                errors.push(format!("analysisType: '{}' is not registered", key));
                return Ok(Verdict::rejected(errors));
            }
            Err(e) => return Err(e),
        };

        let key = analysis_type.key();
        let schema = analysis_type
            .schema
            .unwrap_or_else(|| sonata_core::schema::render(None));
        errors.extend(
            self.validator
                .validate(&schema, &document)?
                .into_iter()
                .map(|violation| violation.to_string()),
        );
        errors.extend(duplicate_file_names(&document));
        Ok(Verdict {
            errors,
            analysis_type: Some(key),
        })
    }
}

/// File names must be unique within one analysis.
fn duplicate_file_names(document: &Value) -> Vec<String> {
    let Some(files) = document.get("files").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut seen = BTreeSet::new();
    let mut repeated = BTreeSet::new();
    for name in files
        .iter()
        .filter_map(|file| file.get("fileName").and_then(Value::as_str))
    {
        if !seen.insert(name) {
            repeated.insert(name);
        }
    }
    repeated
        .into_iter()
        .map(|name| format!("files: duplicate fileName '{}'", name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schema_validator::JsonSchemaValidator;
    use serde_json::json;
    use sonata_db::InMemoryStore;

    async fn setup(mode: ValidationMode) -> (InMemoryStore, ValidationService) {
        let store = InMemoryStore::new();
        let validator: Arc<dyn SchemaValidator> = Arc::new(JsonSchemaValidator);
        let analysis_types = AnalysisTypeService::new(Arc::new(store.clone()), validator.clone());
        analysis_types
            .register(
                "variantCall",
                json!({"type": "object", "required": ["experiment"]}),
            )
            .await
            .unwrap();
        let service =
            ValidationService::new(Arc::new(store.clone()), analysis_types, validator, mode);
        (store, service)
    }

    fn payload(extra: Value) -> String {
        let mut document = json!({
            "studyId": "ABC123",
            "analysisType": "variantCall",
            "samples": [{
                "submitterSampleId": "sa-1",
                "sampleType": "DNA",
                "specimen": {"submitterSpecimenId": "sp-1", "specimenType": "Normal"},
                "donor": {"submitterDonorId": "do-1", "gender": "female"}
            }],
            "files": [{
                "fileName": "a.vcf",
                "fileSize": 10,
                "fileMd5sum": "0123456789abcdef0123456789abcdef",
                "fileType": "VCF",
                "fileAccess": "open"
            }]
        });
        if let (Some(target), Value::Object(extra)) = (document.as_object_mut(), extra) {
            target.extend(extra);
        }
        document.to_string()
    }

    async fn stored(store: &InMemoryStore, payload: String) -> UploadRecord {
        let record = UploadRecord::new("UP1".to_string(), "ABC123".to_string(), None, payload);
        UploadRepository::create(store, &record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn test_valid_payload_is_validated() {
        let (store, service) = setup(ValidationMode::Sync).await;
        let record = stored(&store, payload(json!({"experiment": {}}))).await;

        let outcome = service.submit(&record).await.unwrap();
        assert_eq!(outcome.state, UploadState::Validated);
        assert!(outcome.errors.is_empty());

        let saved = UploadRepository::read(&store, "UP1").await.unwrap().unwrap();
        assert_eq!(saved.state, UploadState::Validated);
        assert_eq!(
            saved.validated_type.map(|key| key.to_string()).as_deref(),
            Some("variantCall:1")
        );
    }

    #[tokio::test]
    async fn test_repeated_file_name_is_a_validation_error() {
        let (store, service) = setup(ValidationMode::Sync).await;
        let file = json!({
            "fileName": "a.vcf",
            "fileSize": 10,
            "fileMd5sum": "0123456789abcdef0123456789abcdef",
            "fileType": "VCF",
            "fileAccess": "open"
        });
        let record = stored(
            &store,
            payload(json!({"experiment": {}, "files": [file.clone(), file]})),
        )
        .await;

        let outcome = service.run(&record).await.unwrap();
        assert_eq!(outcome.state, UploadState::ValidationError);
        assert_eq!(
            outcome.errors,
            vec!["files: duplicate fileName 'a.vcf'".to_string()]
        );

        let saved = UploadRepository::read(&store, "UP1").await.unwrap().unwrap();
        assert_eq!(saved.state, UploadState::ValidationError);
        assert!(saved.validated_type.is_none());
    }

    #[tokio::test]
    async fn test_schema_violations_are_recorded() {
        let (store, service) = setup(ValidationMode::Sync).await;
        let record = stored(&store, payload(json!({"studyId": "XYZ234"}))).await;

        let outcome = service.submit(&record).await.unwrap();
        assert_eq!(outcome.state, UploadState::ValidationError);
        assert!(outcome.errors.iter().any(|e| e.contains("experiment")));
        assert!(outcome.errors.iter().any(|e| e.starts_with("studyId:")));

        let saved = UploadRepository::read(&store, "UP1").await.unwrap().unwrap();
        assert_eq!(saved.state, UploadState::ValidationError);
        assert_eq!(saved.errors, outcome.errors);
    }

    #[tokio::test]
    async fn test_missing_or_unknown_type_is_a_validation_error() {
        let (store, service) = setup(ValidationMode::Sync).await;
        let record = stored(&store, json!({"studyId": "ABC123"}).to_string()).await;
        let outcome = service.run(&record).await.unwrap();
        assert_eq!(outcome.errors, vec!["analysisType: missing".to_string()]);

        let (store, service) = setup(ValidationMode::Sync).await;
        let record = stored(&store, payload(json!({"analysisType": "unknown"}))).await;
        let outcome = service.run(&record).await.unwrap();
        assert_eq!(outcome.state, UploadState::ValidationError);
        assert!(outcome.errors[0].contains("not registered"));
    }

    #[tokio::test]
    async fn test_async_mode_records_verdict_in_background() {
        let (store, service) = setup(ValidationMode::Async).await;
        let record = stored(&store, payload(json!({"experiment": {}}))).await;

        let outcome = service.submit(&record).await.unwrap();
        assert_eq!(outcome.state, UploadState::Created);

        let mut state = UploadState::Created;
        for _ in 0..100 {
            state = UploadRepository::read(&store, "UP1")
                .await
                .unwrap()
                .unwrap()
                .state;
            if state != UploadState::Created {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(state, UploadState::Validated);
    }

    #[tokio::test]
    async fn test_stale_verdict_is_discarded() {
        let (store, service) = setup(ValidationMode::Sync).await;
        let stale = stored(&store, payload(json!({}))).await;

        let mut current = stale.clone();
        current.replace_payload(payload(json!({"experiment": {}})));
        UploadRepository::update(&store, &current).await.unwrap();

        let outcome = service.run(&stale).await.unwrap();
        assert_eq!(outcome.state, UploadState::Updated);
        assert!(outcome.errors.is_empty());
        let saved = UploadRepository::read(&store, "UP1").await.unwrap().unwrap();
        assert_eq!(saved.state, UploadState::Updated);
        assert!(saved.errors.is_empty());

        service.run(&current).await.unwrap();
        let saved = UploadRepository::read(&store, "UP1").await.unwrap().unwrap();
        assert_eq!(saved.state, UploadState::Validated);
    }
}
