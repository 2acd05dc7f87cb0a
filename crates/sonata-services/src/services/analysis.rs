//! Analysis persistence: turns a validated payload into the stored graph of
//! donors, specimens, samples, the analysis and its files, and drives the
//! publication lifecycle.

use chrono::Utc;
use sonata_core::models::{
    Analysis, AnalysisPayload, AnalysisState, AnalysisStateChange, Donor, DonorPayload,
    FilePayload, FileRecord, Sample, SamplePayload, Specimen, SpecimenPayload,
};
use sonata_core::{AnalysisResavePolicy, AppError, IdPrefix};
use sonata_db::{
    AnalysisRepository, DonorRepository, FileRepository, SampleRepository, SpecimenRepository,
};
use std::sync::Arc;

use super::analysis_type::AnalysisTypeService;
use super::id_resolver::{BusinessKey, IdResolver, IdStrategy, Resolution};
use super::study::StudyService;

/// Repositories backing the analysis graph.
#[derive(Clone)]
pub struct AnalysisStores {
    pub analyses: Arc<dyn AnalysisRepository>,
    pub donors: Arc<dyn DonorRepository>,
    pub specimens: Arc<dyn SpecimenRepository>,
    pub samples: Arc<dyn SampleRepository>,
    pub files: Arc<dyn FileRepository>,
}

enum SaveTarget {
    Create(String),
    Replace(Analysis),
}

#[derive(Clone)]
pub struct AnalysisService {
    stores: AnalysisStores,
    studies: StudyService,
    analysis_types: AnalysisTypeService,
    resolver: IdResolver,
    resave_policy: AnalysisResavePolicy,
}

impl AnalysisService {
    pub fn new(
        stores: AnalysisStores,
        studies: StudyService,
        analysis_types: AnalysisTypeService,
        resolver: IdResolver,
        resave_policy: AnalysisResavePolicy,
    ) -> Self {
        Self {
            stores,
            studies,
            analysis_types,
            resolver,
            resave_policy,
        }
    }

    /// Persist `payload` as an UNPUBLISHED analysis of `study_id` and return its id.
    ///
    /// A payload naming an analysis id that already exists fails with
    /// `DuplicateAnalysisAttempt` unless `ignore_collisions` is set and the
    /// resave policy allows replacing the still unpublished analysis.
    #[tracing::instrument(skip(self, payload))]
    pub async fn create(
        &self,
        study_id: &str,
        payload: &AnalysisPayload,
        ignore_collisions: bool,
    ) -> Result<String, AppError> {
        self.studies.check_exists(study_id).await?;
        if let Some(payload_study) = payload.study_id.as_deref() {
            if payload_study != study_id {
                return Err(AppError::InvalidInput(format!(
                    "payload studyId '{}' does not match '{}'",
                    payload_study, study_id
                )));
            }
        }

        let analysis_type = self
            .analysis_types
            .resolve_ref(&payload.analysis_type, true)
            .await?
            .key();

        let target = self
            .save_target(study_id, payload, ignore_collisions)
            .await?;
        let analysis_id = match &target {
            SaveTarget::Create(id) => id.clone(),
            SaveTarget::Replace(existing) => existing.analysis_id.clone(),
        };

        let mut sample_ids = Vec::with_capacity(payload.samples.len());
        for sample in &payload.samples {
            sample_ids.push(self.resolve_sample(study_id, sample).await?);
        }
        let files: Vec<FileRecord> = payload
            .files
            .iter()
            .map(|file| self.file_record(study_id, &analysis_id, file))
            .collect();

        let now = Utc::now();
        let analysis = Analysis {
            analysis_id: analysis_id.clone(),
            study_id: study_id.to_string(),
            analysis_type,
            analysis_state: AnalysisState::Unpublished,
            info: serde_json::Value::Object(payload.info.clone()),
            created_at: now,
            updated_at: now,
        };

        match target {
            SaveTarget::Create(_) => {
                self.stores
                    .analyses
                    .create(&analysis, &sample_ids, &files)
                    .await?;
                tracing::info!(
                    analysis_id = %analysis_id,
                    samples = sample_ids.len(),
                    files = files.len(),
                    "Analysis created"
                );
            }
            SaveTarget::Replace(_) => {
                let rows = self
                    .stores
                    .analyses
                    .replace_unpublished(&analysis, &sample_ids, &files)
                    .await?;
                if rows == 0 {
                    // Published (or removed) between the check and the write.
                    let current = self.read(&analysis_id).await?;
                    return Err(AppError::IllegalAnalysisResave {
                        analysis_id,
                        state: current.analysis_state.to_string(),
                    });
                }
                tracing::info!(analysis_id = %analysis_id, "Unpublished analysis replaced");
            }
        }

        Ok(analysis_id)
    }

    async fn save_target(
        &self,
        study_id: &str,
        payload: &AnalysisPayload,
        ignore_collisions: bool,
    ) -> Result<SaveTarget, AppError> {
        let Some(requested) = payload.requested_analysis_id() else {
            return Ok(SaveTarget::Create(self.resolver.generate(IdPrefix::Analysis)));
        };

        let parts = [requested];
        let key = BusinessKey::new(
            "analysis",
            IdPrefix::Analysis,
            &parts,
            IdStrategy::Verbatim,
        );
        let resolution = self
            .resolver
            .resolve(&key, || async {
                self.stores
                    .analyses
                    .read(requested)
                    .await
                    .map(|found| found.into_iter().collect::<Vec<_>>())
            })
            .await?;

        match resolution {
            Resolution::Fresh(id) => Ok(SaveTarget::Create(id)),
            Resolution::Existing(existing) => {
                let replaceable = ignore_collisions
                    && existing.study_id == study_id
                    && self.resave_policy == AnalysisResavePolicy::ReplaceUnpublished;
                if !replaceable {
                    tracing::debug!(analysis_id = %requested, "Duplicate analysis id rejected");
                    return Err(AppError::DuplicateAnalysisAttempt(requested.to_string()));
                }
                if existing.analysis_state != AnalysisState::Unpublished {
                    return Err(AppError::IllegalAnalysisResave {
                        analysis_id: existing.analysis_id,
                        state: existing.analysis_state.to_string(),
                    });
                }
                Ok(SaveTarget::Replace(existing))
            }
        }
    }

    async fn resolve_donor(
        &self,
        study_id: &str,
        donor: &DonorPayload,
    ) -> Result<String, AppError> {
        let parts = [study_id, donor.submitter_donor_id.as_str()];
        let key = BusinessKey::new("donor", IdPrefix::Donor, &parts, IdStrategy::Deterministic);
        let resolution = self
            .resolver
            .resolve(&key, || {
                self.stores
                    .donors
                    .find_by_business_key(study_id, &donor.submitter_donor_id)
            })
            .await?;

        match resolution {
            Resolution::Existing(mut existing) => {
                if existing.gender != donor.gender || existing.info != donor.info {
                    existing.gender = donor.gender.clone();
                    existing.info = donor.info.clone();
                    let rows = self.stores.donors.update(&existing).await?;
                    AppError::expect_single_row("donor", &existing.donor_id, rows)?;
                }
                Ok(existing.donor_id)
            }
            Resolution::Fresh(donor_id) => {
                self.stores
                    .donors
                    .create(&Donor {
                        donor_id: donor_id.clone(),
                        study_id: study_id.to_string(),
                        submitter_donor_id: donor.submitter_donor_id.clone(),
                        gender: donor.gender.clone(),
                        info: donor.info.clone(),
                    })
                    .await?;
                Ok(donor_id)
            }
        }
    }

    async fn resolve_specimen(
        &self,
        study_id: &str,
        donor_id: &str,
        specimen: &SpecimenPayload,
    ) -> Result<String, AppError> {
        let parts = [study_id, specimen.submitter_specimen_id.as_str()];
        let key = BusinessKey::new(
            "specimen",
            IdPrefix::Specimen,
            &parts,
            IdStrategy::Deterministic,
        );
        let resolution = self
            .resolver
            .resolve(&key, || {
                self.stores
                    .specimens
                    .find_by_business_key(study_id, &specimen.submitter_specimen_id)
            })
            .await?;

        let record = |specimen_id: String| Specimen {
            specimen_id,
            donor_id: donor_id.to_string(),
            study_id: study_id.to_string(),
            submitter_specimen_id: specimen.submitter_specimen_id.clone(),
            specimen_type: specimen.specimen_type.clone(),
            tissue_source: specimen.tissue_source.clone(),
            info: specimen.info.clone(),
        };

        match resolution {
            Resolution::Existing(existing) => {
                let updated = record(existing.specimen_id.clone());
                if updated != existing {
                    let rows = self.stores.specimens.update(&updated).await?;
                    AppError::expect_single_row("specimen", &updated.specimen_id, rows)?;
                }
                Ok(updated.specimen_id)
            }
            Resolution::Fresh(specimen_id) => {
                let created = record(specimen_id);
                self.stores.specimens.create(&created).await?;
                Ok(created.specimen_id)
            }
        }
    }

    async fn resolve_sample(
        &self,
        study_id: &str,
        sample: &SamplePayload,
    ) -> Result<String, AppError> {
        let donor_id = self.resolve_donor(study_id, &sample.donor).await?;
        let specimen_id = self
            .resolve_specimen(study_id, &donor_id, &sample.specimen)
            .await?;

        let parts = [study_id, sample.submitter_sample_id.as_str()];
        let key = BusinessKey::new("sample", IdPrefix::Sample, &parts, IdStrategy::Deterministic);
        let resolution = self
            .resolver
            .resolve(&key, || {
                self.stores
                    .samples
                    .find_by_business_key(study_id, &sample.submitter_sample_id)
            })
            .await?;

        let record = |sample_id: String| Sample {
            sample_id,
            specimen_id: specimen_id.clone(),
            study_id: study_id.to_string(),
            submitter_sample_id: sample.submitter_sample_id.clone(),
            sample_type: sample.sample_type.clone(),
            info: sample.info.clone(),
        };

        match resolution {
            Resolution::Existing(existing) => {
                let updated = record(existing.sample_id.clone());
                if updated != existing {
                    let rows = self.stores.samples.update(&updated).await?;
                    AppError::expect_single_row("sample", &updated.sample_id, rows)?;
                }
                Ok(updated.sample_id)
            }
            Resolution::Fresh(sample_id) => {
                let created = record(sample_id);
                self.stores.samples.create(&created).await?;
                Ok(created.sample_id)
            }
        }
    }

    fn file_record(&self, study_id: &str, analysis_id: &str, file: &FilePayload) -> FileRecord {
        FileRecord {
            object_id: self
                .resolver
                .generate_deterministic(IdPrefix::File, &[analysis_id, file.file_name.as_str()]),
            analysis_id: analysis_id.to_string(),
            study_id: study_id.to_string(),
            file_name: file.file_name.clone(),
            file_size: file.file_size,
            file_md5sum: file.file_md5sum.clone(),
            file_access: file.file_access,
            file_type: file.file_type.clone(),
            info: file.info.clone(),
        }
    }

    pub async fn read(&self, analysis_id: &str) -> Result<Analysis, AppError> {
        self.stores
            .analyses
            .read(analysis_id)
            .await?
            .ok_or_else(|| AppError::AnalysisIdNotFound(analysis_id.to_string()))
    }

    /// Read an analysis, treating one owned by another study as absent.
    pub async fn read_in_study(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> Result<Analysis, AppError> {
        self.studies.check_exists(study_id).await?;
        let analysis = self.read(analysis_id).await?;
        if analysis.study_id != study_id {
            return Err(AppError::AnalysisIdNotFound(analysis_id.to_string()));
        }
        Ok(analysis)
    }

    /// Publish, suppress or unpublish an analysis.
    #[tracing::instrument(skip(self))]
    pub async fn update_state(
        &self,
        study_id: &str,
        analysis_id: &str,
        state: AnalysisState,
    ) -> Result<AnalysisStateChange, AppError> {
        let analysis = self.read_in_study(study_id, analysis_id).await?;
        let rows = self.stores.analyses.update_state(analysis_id, state).await?;
        AppError::expect_single_row("analysis", analysis_id, rows)?;

        tracing::info!(
            analysis_id = %analysis_id,
            from = %analysis.analysis_state,
            to = %state,
            "Analysis state changed"
        );
        Ok(AnalysisStateChange {
            analysis_id: analysis_id.to_string(),
            previous_state: analysis.analysis_state,
            analysis_state: state,
        })
    }

    pub async fn read_files(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> Result<Vec<FileRecord>, AppError> {
        self.read_in_study(study_id, analysis_id).await?;
        self.stores.files.list_by_analysis(analysis_id).await
    }

    pub async fn read_samples(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> Result<Vec<Sample>, AppError> {
        self.read_in_study(study_id, analysis_id).await?;
        let mut samples = Vec::new();
        for sample_id in self.stores.analyses.sample_ids(analysis_id).await? {
            let sample = self.stores.samples.read(&sample_id).await?.ok_or_else(|| {
                AppError::Internal(format!(
                    "analysis '{}' links missing sample '{}'",
                    analysis_id, sample_id
                ))
            })?;
            samples.push(sample);
        }
        Ok(samples)
    }
}
