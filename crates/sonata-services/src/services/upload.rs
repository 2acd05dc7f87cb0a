//! Upload ingestion and save.
//!
//! An upload without an `analysisId` is always a new record. With one, the
//! `(studyId, analysisId)` business key selects the record to overwrite, so
//! re-submitting an analysis replaces the pending payload instead of piling up
//! duplicates. Every ingestion restarts validation; only a VALIDATED (or
//! previously SAVED) upload can be saved.

use serde_json::Value;
use sonata_core::models::{
    AnalysisPayload, AnalysisTypeRef, IngestResponse, SaveResponse, UploadRecord, UploadState,
};
use sonata_core::{AppError, IdPrefix};
use sonata_db::UploadRepository;
use std::sync::Arc;

use super::analysis::AnalysisService;
use super::id_resolver::{BusinessKey, IdResolver, IdStrategy, Resolution};
use super::study::StudyService;
use super::validation::ValidationService;

const STATUS_OK: &str = "ok";

#[derive(Clone)]
pub struct UploadService {
    uploads: Arc<dyn UploadRepository>,
    studies: StudyService,
    validation: ValidationService,
    analyses: AnalysisService,
    resolver: IdResolver,
    retain_saved_payload: bool,
}

impl UploadService {
    pub fn new(
        uploads: Arc<dyn UploadRepository>,
        studies: StudyService,
        validation: ValidationService,
        analyses: AnalysisService,
        resolver: IdResolver,
        retain_saved_payload: bool,
    ) -> Self {
        Self {
            uploads,
            studies,
            validation,
            analyses,
            resolver,
            retain_saved_payload,
        }
    }

    #[tracing::instrument(skip(self, payload))]
    pub async fn ingest(&self, study_id: &str, payload: &str) -> Result<IngestResponse, AppError> {
        self.studies.check_exists(study_id).await?;

        let document: Value = serde_json::from_str(payload)?;
        if !document.is_object() {
            return Err(AppError::PayloadParsing(
                "the payload must be a JSON object".to_string(),
            ));
        }
        let analysis_id = document
            .get("analysisId")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let (record, replaced) = match analysis_id {
            None => (self.create_new(study_id, payload).await?, None),
            Some(analysis_id) => self.upsert(study_id, analysis_id, payload).await?,
        };

        let outcome = self.validation.submit(&record).await?;
        let status = match (&replaced, analysis_id) {
            (Some(_), Some(analysis_id)) => format!(
                "WARNING: replaced content for analysisId '{}'",
                analysis_id
            ),
            _ => STATUS_OK.to_string(),
        };

        tracing::info!(
            upload_id = %record.upload_id,
            state = %outcome.state,
            replaced = replaced.is_some(),
            "Upload ingested"
        );
        Ok(IngestResponse {
            upload_id: record.upload_id,
            status,
            replaced,
            state: outcome.state,
            errors: outcome.errors,
        })
    }

    async fn create_new(&self, study_id: &str, payload: &str) -> Result<UploadRecord, AppError> {
        let record = UploadRecord::new(
            self.resolver.generate(IdPrefix::Upload),
            study_id.to_string(),
            None,
            payload.to_string(),
        );
        self.uploads.create(&record).await?;
        Ok(record)
    }

    /// Create or overwrite the upload holding `(study_id, analysis_id)`.
    ///
    /// Losing the race to create the first record for a key surfaces as
    /// `UploadConflict`; one more resolution then finds the winner's record.
    async fn upsert(
        &self,
        study_id: &str,
        analysis_id: &str,
        payload: &str,
    ) -> Result<(UploadRecord, Option<String>), AppError> {
        match self.try_upsert(study_id, analysis_id, payload).await {
            Err(AppError::UploadConflict { .. }) => {
                tracing::debug!(
                    study_id = %study_id,
                    analysis_id = %analysis_id,
                    "Concurrent upload for the same analysis, retrying"
                );
                self.try_upsert(study_id, analysis_id, payload).await
            }
            other => other,
        }
    }

    async fn try_upsert(
        &self,
        study_id: &str,
        analysis_id: &str,
        payload: &str,
    ) -> Result<(UploadRecord, Option<String>), AppError> {
        let parts = [study_id, analysis_id];
        let key = BusinessKey::new("upload", IdPrefix::Upload, &parts, IdStrategy::Random);
        let resolution = self
            .resolver
            .resolve(&key, || {
                self.uploads.find_by_business_key(study_id, analysis_id)
            })
            .await?;

        match resolution {
            Resolution::Existing(mut record) => {
                record.replace_payload(payload.to_string());
                let rows = self.uploads.update(&record).await?;
                AppError::expect_single_row("upload", &record.upload_id, rows)?;
                let replaced = record.replaced_payload.clone();
                Ok((record, replaced))
            }
            Resolution::Fresh(upload_id) => {
                let record = UploadRecord::new(
                    upload_id,
                    study_id.to_string(),
                    Some(analysis_id.to_string()),
                    payload.to_string(),
                );
                self.uploads.create(&record).await?;
                Ok((record, None))
            }
        }
    }

    pub async fn read(&self, upload_id: &str) -> Result<UploadRecord, AppError> {
        self.uploads
            .read(upload_id)
            .await?
            .ok_or_else(|| AppError::UploadIdNotFound(upload_id.to_string()))
    }

    pub async fn list(
        &self,
        study_id: &str,
        state: Option<UploadState>,
    ) -> Result<Vec<UploadRecord>, AppError> {
        self.studies.check_exists(study_id).await?;
        self.uploads.list_by_study(study_id, state).await
    }

    /// Persist the analysis carried by a validated upload and mark it SAVED.
    #[tracing::instrument(skip(self))]
    pub async fn save(
        &self,
        study_id: &str,
        upload_id: &str,
        ignore_collisions: bool,
    ) -> Result<SaveResponse, AppError> {
        self.studies.check_exists(study_id).await?;
        let record = self.read(upload_id).await?;
        if record.study_id != study_id {
            tracing::debug!(upload_id = %upload_id, "Upload belongs to another study");
            return Err(AppError::UploadIdNotFound(upload_id.to_string()));
        }
        if !record.state.is_saveable() {
            return Err(AppError::UploadIdNotValidated {
                upload_id: upload_id.to_string(),
                state: record.state.to_string(),
            });
        }

        let mut payload: AnalysisPayload = serde_json::from_str(&record.payload)?;
        // Save against the exact type version the payload was validated with.
        if let Some(key) = &record.validated_type {
            payload.analysis_type = AnalysisTypeRef::Exact {
                name: key.name.clone(),
                version: Some(key.version),
            };
        }
        let analysis_id = self
            .analyses
            .create(study_id, &payload, ignore_collisions)
            .await?;
        if analysis_id.trim().is_empty() {
            return Err(AppError::AnalysisIdNotCreated(upload_id.to_string()));
        }

        let rows = self
            .uploads
            .mark_saved(upload_id, &record.payload, self.retain_saved_payload)
            .await?;
        AppError::expect_single_row("upload", upload_id, rows)?;

        tracing::info!(
            upload_id = %upload_id,
            analysis_id = %analysis_id,
            "Upload saved"
        );
        Ok(SaveResponse {
            analysis_id,
            status: STATUS_OK.to_string(),
        })
    }
}
