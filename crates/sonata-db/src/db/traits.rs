//! Repository trait abstractions
//!
//! One trait per entity kind. The services depend only on these, so the same
//! workflow runs against PostgreSQL or the in-memory store. No business rules
//! live here: writes report affected-row counts and the caller decides what a
//! zero count means.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sonata_core::error::AppError;
use sonata_core::models::{
    Analysis, AnalysisState, AnalysisType, AnalysisTypeKey, AnalysisTypeQuery, Donor, FileRecord,
    FileUpdate, Sample, Specimen, Study, UploadRecord, UploadState,
};

#[async_trait]
pub trait StudyRepository: Send + Sync {
    /// Fails with `StudyAlreadyExists` if the id is taken.
    async fn create(&self, study: &Study) -> Result<(), AppError>;

    async fn read(&self, study_id: &str) -> Result<Option<Study>, AppError>;

    async fn exists(&self, study_id: &str) -> Result<bool, AppError>;
}

#[async_trait]
pub trait UploadRepository: Send + Sync {
    /// Fails with `UploadConflict` when another record already holds the business key.
    async fn create(&self, upload: &UploadRecord) -> Result<(), AppError>;

    async fn read(&self, upload_id: &str) -> Result<Option<UploadRecord>, AppError>;

    /// Overwrite every mutable column of the record.
    async fn update(&self, upload: &UploadRecord) -> Result<u64, AppError>;

    /// Store a validation verdict, but only if the record still holds `payload`
    /// and is still waiting for validation. Zero rows means a newer ingestion won.
    /// `validated_type` pins the analysis type version the payload passed against.
    async fn record_validation(
        &self,
        upload_id: &str,
        payload: &str,
        state: UploadState,
        errors: &[String],
        validated_type: Option<&AnalysisTypeKey>,
    ) -> Result<u64, AppError>;

    /// Move a VALIDATED or SAVED record that still holds `payload` to SAVED.
    /// `replaced_payload` is dropped unless `retain_replaced` is set.
    async fn mark_saved(
        &self,
        upload_id: &str,
        payload: &str,
        retain_replaced: bool,
    ) -> Result<u64, AppError>;

    async fn delete(&self, upload_id: &str) -> Result<u64, AppError>;

    async fn find_by_business_key(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> Result<Vec<UploadRecord>, AppError>;

    async fn list_by_study(
        &self,
        study_id: &str,
        state: Option<UploadState>,
    ) -> Result<Vec<UploadRecord>, AppError>;
}

#[async_trait]
pub trait AnalysisTypeRepository: Send + Sync {
    /// Store `schema` under the next version of `name`. Version allocation is
    /// serialized per name.
    async fn register(&self, name: &str, schema: &JsonValue) -> Result<AnalysisType, AppError>;

    /// `version: None` reads the latest version.
    async fn read(&self, name: &str, version: Option<i32>)
        -> Result<Option<AnalysisType>, AppError>;

    /// One page of matches (stored schemas) and the total match count.
    async fn list(&self, query: &AnalysisTypeQuery)
        -> Result<(Vec<AnalysisType>, i64), AppError>;
}

#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Insert the analysis, its sample links and its files atomically.
    async fn create(
        &self,
        analysis: &Analysis,
        sample_ids: &[String],
        files: &[FileRecord],
    ) -> Result<(), AppError>;

    async fn read(&self, analysis_id: &str) -> Result<Option<Analysis>, AppError>;

    /// Swap type, info, sample links and files of an analysis that is still
    /// UNPUBLISHED, atomically. Zero rows means it vanished or was published.
    async fn replace_unpublished(
        &self,
        analysis: &Analysis,
        sample_ids: &[String],
        files: &[FileRecord],
    ) -> Result<u64, AppError>;

    async fn update_state(&self, analysis_id: &str, state: AnalysisState)
        -> Result<u64, AppError>;

    async fn sample_ids(&self, analysis_id: &str) -> Result<Vec<String>, AppError>;
}

#[async_trait]
pub trait DonorRepository: Send + Sync {
    async fn create(&self, donor: &Donor) -> Result<(), AppError>;

    async fn read(&self, donor_id: &str) -> Result<Option<Donor>, AppError>;

    async fn update(&self, donor: &Donor) -> Result<u64, AppError>;

    async fn find_by_business_key(
        &self,
        study_id: &str,
        submitter_donor_id: &str,
    ) -> Result<Vec<Donor>, AppError>;
}

#[async_trait]
pub trait SpecimenRepository: Send + Sync {
    async fn create(&self, specimen: &Specimen) -> Result<(), AppError>;

    async fn read(&self, specimen_id: &str) -> Result<Option<Specimen>, AppError>;

    async fn update(&self, specimen: &Specimen) -> Result<u64, AppError>;

    async fn find_by_business_key(
        &self,
        study_id: &str,
        submitter_specimen_id: &str,
    ) -> Result<Vec<Specimen>, AppError>;
}

#[async_trait]
pub trait SampleRepository: Send + Sync {
    async fn create(&self, sample: &Sample) -> Result<(), AppError>;

    async fn read(&self, sample_id: &str) -> Result<Option<Sample>, AppError>;

    async fn update(&self, sample: &Sample) -> Result<u64, AppError>;

    async fn find_by_business_key(
        &self,
        study_id: &str,
        submitter_sample_id: &str,
    ) -> Result<Vec<Sample>, AppError>;
}

#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn read(&self, object_id: &str) -> Result<Option<FileRecord>, AppError>;

    /// Write only the fields present in `update`.
    ///
    /// With `require_unpublished` the owning analysis must be UNPUBLISHED at
    /// the moment of the write, checked atomically with it. Zero rows means the
    /// file is gone or its analysis is in a state that refuses the change.
    async fn apply_update(
        &self,
        object_id: &str,
        update: &FileUpdate,
        require_unpublished: bool,
    ) -> Result<u64, AppError>;

    async fn list_by_analysis(&self, analysis_id: &str) -> Result<Vec<FileRecord>, AppError>;
}
