//! In-memory implementations of every repository trait.
//!
//! Used by tests and embedded setups that run the full workflow without a
//! database. Constraint behaviour mirrors the PostgreSQL schema: upload
//! business keys are unique, analysis type versions are allocated under the
//! write lock, and conditional updates report zero rows when they do not apply.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sonata_core::{
    models::{
        Analysis, AnalysisState, AnalysisType, AnalysisTypeKey, AnalysisTypeQuery,
        AnalysisTypeSortOrder, Donor, FileRecord, FileUpdate, Sample, SortDirection, Specimen,
        Study, UploadRecord, UploadState,
    },
    AppError,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{
    AnalysisRepository, AnalysisTypeRepository, DonorRepository, FileRepository,
    SampleRepository, SpecimenRepository, StudyRepository, UploadRepository,
};

#[derive(Default)]
struct Tables {
    studies: HashMap<String, Study>,
    uploads: HashMap<String, UploadRecord>,
    analysis_types: Vec<AnalysisType>,
    analyses: HashMap<String, Analysis>,
    analysis_samples: HashMap<String, Vec<String>>,
    donors: HashMap<String, Donor>,
    specimens: HashMap<String, Specimen>,
    samples: HashMap<String, Sample>,
    files: BTreeMap<String, FileRecord>,
}

/// Shared in-memory store; clones see the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    /// Rejects files whose object id or name repeats within the batch, or whose
    /// object id is held by a file of another analysis.
    fn check_file_keys(&self, analysis_id: &str, files: &[FileRecord]) -> Result<(), AppError> {
        let mut object_ids = HashSet::new();
        let mut names = HashSet::new();
        for file in files {
            let taken = self
                .files
                .get(&file.object_id)
                .is_some_and(|existing| existing.analysis_id != analysis_id);
            if taken || !object_ids.insert(file.object_id.as_str()) {
                return Err(AppError::DuplicateRecord {
                    entity: "file",
                    id: file.object_id.clone(),
                });
            }
            if !names.insert(file.file_name.as_str()) {
                return Err(AppError::DuplicateRecord {
                    entity: "file",
                    id: format!("{}/{}", analysis_id, file.file_name),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StudyRepository for InMemoryStore {
    async fn create(&self, study: &Study) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.studies.contains_key(&study.study_id) {
            return Err(AppError::StudyAlreadyExists(study.study_id.clone()));
        }
        tables
            .studies
            .insert(study.study_id.clone(), study.clone());
        Ok(())
    }

    async fn read(&self, study_id: &str) -> Result<Option<Study>, AppError> {
        Ok(self.tables.read().await.studies.get(study_id).cloned())
    }

    async fn exists(&self, study_id: &str) -> Result<bool, AppError> {
        Ok(self.tables.read().await.studies.contains_key(study_id))
    }
}

#[async_trait]
impl UploadRepository for InMemoryStore {
    async fn create(&self, upload: &UploadRecord) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if let Some(analysis_id) = &upload.analysis_id {
            let taken = tables.uploads.values().any(|existing| {
                existing.study_id == upload.study_id
                    && existing.analysis_id.as_deref() == Some(analysis_id.as_str())
            });
            if taken {
                return Err(AppError::UploadConflict {
                    study_id: upload.study_id.clone(),
                    analysis_id: analysis_id.clone(),
                });
            }
        }
        if tables.uploads.contains_key(&upload.upload_id) {
            return Err(AppError::Internal(format!(
                "upload id '{}' generated twice",
                upload.upload_id
            )));
        }
        tables
            .uploads
            .insert(upload.upload_id.clone(), upload.clone());
        Ok(())
    }

    async fn read(&self, upload_id: &str) -> Result<Option<UploadRecord>, AppError> {
        Ok(self.tables.read().await.uploads.get(upload_id).cloned())
    }

    async fn update(&self, upload: &UploadRecord) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        match tables.uploads.get_mut(&upload.upload_id) {
            Some(existing) => {
                existing.analysis_id = upload.analysis_id.clone();
                existing.state = upload.state;
                existing.payload = upload.payload.clone();
                existing.replaced_payload = upload.replaced_payload.clone();
                existing.errors = upload.errors.clone();
                existing.validated_type = upload.validated_type.clone();
                existing.updated_at = upload.updated_at;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn record_validation(
        &self,
        upload_id: &str,
        payload: &str,
        state: UploadState,
        errors: &[String],
        validated_type: Option<&AnalysisTypeKey>,
    ) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        match tables.uploads.get_mut(upload_id) {
            Some(existing) if existing.payload == payload && existing.state.is_pending() => {
                existing.state = state;
                existing.errors = errors.to_vec();
                existing.validated_type = validated_type.cloned();
                existing.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn mark_saved(
        &self,
        upload_id: &str,
        payload: &str,
        retain_replaced: bool,
    ) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        match tables.uploads.get_mut(upload_id) {
            Some(existing) if existing.payload == payload && existing.state.is_saveable() => {
                existing.state = UploadState::Saved;
                existing.errors.clear();
                if !retain_replaced {
                    existing.replaced_payload = None;
                }
                existing.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete(&self, upload_id: &str) -> Result<u64, AppError> {
        let removed = self.tables.write().await.uploads.remove(upload_id);
        Ok(u64::from(removed.is_some()))
    }

    async fn find_by_business_key(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> Result<Vec<UploadRecord>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .uploads
            .values()
            .filter(|u| u.study_id == study_id && u.analysis_id.as_deref() == Some(analysis_id))
            .cloned()
            .collect())
    }

    async fn list_by_study(
        &self,
        study_id: &str,
        state: Option<UploadState>,
    ) -> Result<Vec<UploadRecord>, AppError> {
        let tables = self.tables.read().await;
        let mut uploads: Vec<UploadRecord> = tables
            .uploads
            .values()
            .filter(|u| u.study_id == study_id && state.map_or(true, |s| u.state == s))
            .cloned()
            .collect();
        uploads.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.upload_id.cmp(&b.upload_id))
        });
        Ok(uploads)
    }
}

fn compare_types(
    a: &AnalysisType,
    b: &AnalysisType,
    orders: &[AnalysisTypeSortOrder],
    direction: SortDirection,
) -> Ordering {
    let mut ordering = Ordering::Equal;
    for order in orders {
        let next = match order {
            AnalysisTypeSortOrder::Name => a.name.cmp(&b.name),
            AnalysisTypeSortOrder::Version => a.version.cmp(&b.version),
        };
        let next = match direction {
            SortDirection::Asc => next,
            SortDirection::Desc => next.reverse(),
        };
        ordering = ordering.then(next);
    }
    ordering
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.version.cmp(&b.version))
}

#[async_trait]
impl AnalysisTypeRepository for InMemoryStore {
    async fn register(&self, name: &str, schema: &JsonValue) -> Result<AnalysisType, AppError> {
        let mut tables = self.tables.write().await;
        let next_version = tables
            .analysis_types
            .iter()
            .filter(|t| t.name == name)
            .map(|t| t.version)
            .max()
            .unwrap_or(0)
            + 1;
        let analysis_type = AnalysisType {
            name: name.to_string(),
            version: next_version,
            schema: Some(schema.clone()),
            created_at: Utc::now(),
        };
        tables.analysis_types.push(analysis_type.clone());
        Ok(analysis_type)
    }

    async fn read(
        &self,
        name: &str,
        version: Option<i32>,
    ) -> Result<Option<AnalysisType>, AppError> {
        let tables = self.tables.read().await;
        let mut matches = tables.analysis_types.iter().filter(|t| t.name == name);
        let found = match version {
            Some(version) => matches.find(|t| t.version == version),
            None => matches.max_by_key(|t| t.version),
        };
        Ok(found.cloned())
    }

    async fn list(
        &self,
        query: &AnalysisTypeQuery,
    ) -> Result<(Vec<AnalysisType>, i64), AppError> {
        let tables = self.tables.read().await;
        let mut matches: Vec<AnalysisType> = tables
            .analysis_types
            .iter()
            .filter(|t| query.names.is_empty() || query.names.contains(&t.name))
            .filter(|t| query.versions.is_empty() || query.versions.contains(&t.version))
            .cloned()
            .collect();
        let total = matches.len() as i64;

        let orders = query.effective_sort_orders();
        matches.sort_by(|a, b| compare_types(a, b, &orders, query.sort_direction));

        let items = matches
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(0))
            .take(usize::try_from(query.limit).unwrap_or(0))
            .collect();
        Ok((items, total))
    }
}

#[async_trait]
impl AnalysisRepository for InMemoryStore {
    async fn create(
        &self,
        analysis: &Analysis,
        sample_ids: &[String],
        files: &[FileRecord],
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.analyses.contains_key(&analysis.analysis_id) {
            return Err(AppError::DuplicateAnalysisAttempt(
                analysis.analysis_id.clone(),
            ));
        }
        tables.check_file_keys(&analysis.analysis_id, files)?;
        tables
            .analyses
            .insert(analysis.analysis_id.clone(), analysis.clone());
        tables
            .analysis_samples
            .insert(analysis.analysis_id.clone(), sample_ids.to_vec());
        for file in files {
            tables.files.insert(file.object_id.clone(), file.clone());
        }
        Ok(())
    }

    async fn read(&self, analysis_id: &str) -> Result<Option<Analysis>, AppError> {
        Ok(self.tables.read().await.analyses.get(analysis_id).cloned())
    }

    async fn replace_unpublished(
        &self,
        analysis: &Analysis,
        sample_ids: &[String],
        files: &[FileRecord],
    ) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        let replaceable = tables
            .analyses
            .get(&analysis.analysis_id)
            .is_some_and(|existing| existing.analysis_state == AnalysisState::Unpublished);
        if !replaceable {
            return Ok(0);
        }
        tables.check_file_keys(&analysis.analysis_id, files)?;
        match tables.analyses.get_mut(&analysis.analysis_id) {
            Some(existing) => {
                existing.analysis_type = analysis.analysis_type.clone();
                existing.info = analysis.info.clone();
                existing.updated_at = Utc::now();
            }
            _ => return Ok(0),
        }
        tables
            .analysis_samples
            .insert(analysis.analysis_id.clone(), sample_ids.to_vec());
        tables
            .files
            .retain(|_, file| file.analysis_id != analysis.analysis_id);
        for file in files {
            tables.files.insert(file.object_id.clone(), file.clone());
        }
        Ok(1)
    }

    async fn update_state(
        &self,
        analysis_id: &str,
        state: AnalysisState,
    ) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        match tables.analyses.get_mut(analysis_id) {
            Some(existing) => {
                existing.analysis_state = state;
                existing.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn sample_ids(&self, analysis_id: &str) -> Result<Vec<String>, AppError> {
        let tables = self.tables.read().await;
        let mut ids = tables
            .analysis_samples
            .get(analysis_id)
            .cloned()
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl DonorRepository for InMemoryStore {
    async fn create(&self, donor: &Donor) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.donors.contains_key(&donor.donor_id) {
            return Err(AppError::DuplicateRecord {
                entity: "donor",
                id: donor.donor_id.clone(),
            });
        }
        tables.donors.insert(donor.donor_id.clone(), donor.clone());
        Ok(())
    }

    async fn read(&self, donor_id: &str) -> Result<Option<Donor>, AppError> {
        Ok(self.tables.read().await.donors.get(donor_id).cloned())
    }

    async fn update(&self, donor: &Donor) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        match tables.donors.get_mut(&donor.donor_id) {
            Some(existing) => {
                existing.gender = donor.gender.clone();
                existing.info = donor.info.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_by_business_key(
        &self,
        study_id: &str,
        submitter_donor_id: &str,
    ) -> Result<Vec<Donor>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .donors
            .values()
            .filter(|d| d.study_id == study_id && d.submitter_donor_id == submitter_donor_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SpecimenRepository for InMemoryStore {
    async fn create(&self, specimen: &Specimen) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.specimens.contains_key(&specimen.specimen_id) {
            return Err(AppError::DuplicateRecord {
                entity: "specimen",
                id: specimen.specimen_id.clone(),
            });
        }
        tables.specimens.insert(specimen.specimen_id.clone(), specimen.clone());
        Ok(())
    }

    async fn read(&self, specimen_id: &str) -> Result<Option<Specimen>, AppError> {
        Ok(self.tables.read().await.specimens.get(specimen_id).cloned())
    }

    async fn update(&self, specimen: &Specimen) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        match tables.specimens.get_mut(&specimen.specimen_id) {
            Some(existing) => {
                existing.donor_id = specimen.donor_id.clone();
                existing.specimen_type = specimen.specimen_type.clone();
                existing.tissue_source = specimen.tissue_source.clone();
                existing.info = specimen.info.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_by_business_key(
        &self,
        study_id: &str,
        submitter_specimen_id: &str,
    ) -> Result<Vec<Specimen>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .specimens
            .values()
            .filter(|s| {
                s.study_id == study_id && s.submitter_specimen_id == submitter_specimen_id
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SampleRepository for InMemoryStore {
    async fn create(&self, sample: &Sample) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.samples.contains_key(&sample.sample_id) {
            return Err(AppError::DuplicateRecord {
                entity: "sample",
                id: sample.sample_id.clone(),
            });
        }
        tables.samples.insert(sample.sample_id.clone(), sample.clone());
        Ok(())
    }

    async fn read(&self, sample_id: &str) -> Result<Option<Sample>, AppError> {
        Ok(self.tables.read().await.samples.get(sample_id).cloned())
    }

    async fn update(&self, sample: &Sample) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        match tables.samples.get_mut(&sample.sample_id) {
            Some(existing) => {
                existing.specimen_id = sample.specimen_id.clone();
                existing.sample_type = sample.sample_type.clone();
                existing.info = sample.info.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_by_business_key(
        &self,
        study_id: &str,
        submitter_sample_id: &str,
    ) -> Result<Vec<Sample>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .samples
            .values()
            .filter(|s| s.study_id == study_id && s.submitter_sample_id == submitter_sample_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FileRepository for InMemoryStore {
    async fn read(&self, object_id: &str) -> Result<Option<FileRecord>, AppError> {
        Ok(self.tables.read().await.files.get(object_id).cloned())
    }

    async fn apply_update(
        &self,
        object_id: &str,
        update: &FileUpdate,
        require_unpublished: bool,
    ) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        let Some(analysis_id) = tables.files.get(object_id).map(|f| f.analysis_id.clone()) else {
            return Ok(0);
        };
        let state = tables.analyses.get(&analysis_id).map(|a| a.analysis_state);
        let permitted = match state {
            Some(state) => !require_unpublished || state == AnalysisState::Unpublished,
            None => false,
        };
        if !permitted {
            return Ok(0);
        }
        match tables.files.get_mut(object_id) {
            Some(file) => {
                *file = update.apply_to(file);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn list_by_analysis(&self, analysis_id: &str) -> Result<Vec<FileRecord>, AppError> {
        let tables = self.tables.read().await;
        let mut files: Vec<FileRecord> = tables
            .files
            .values()
            .filter(|f| f.analysis_id == analysis_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn upload(id: &str, study: &str, analysis: Option<&str>) -> UploadRecord {
        UploadRecord::new(
            id.to_string(),
            study.to_string(),
            analysis.map(str::to_string),
            "{}".to_string(),
        )
    }

    #[tokio::test]
    async fn test_upload_business_key_is_unique() {
        let store = InMemoryStore::new();
        UploadRepository::create(&store, &upload("UP1", "ABC123", Some("AN1")))
            .await
            .unwrap();

        let err = UploadRepository::create(&store, &upload("UP2", "ABC123", Some("AN1")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UploadConflict { .. }));

        // Same analysis id in another study, and uploads without one, never collide.
        UploadRepository::create(&store, &upload("UP3", "XYZ234", Some("AN1")))
            .await
            .unwrap();
        UploadRepository::create(&store, &upload("UP4", "ABC123", None))
            .await
            .unwrap();
        UploadRepository::create(&store, &upload("UP5", "ABC123", None))
            .await
            .unwrap();

        let found = UploadRepository::find_by_business_key(&store, "ABC123", "AN1")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].upload_id, "UP1");
    }

    #[tokio::test]
    async fn test_record_validation_only_applies_to_current_payload() {
        let store = InMemoryStore::new();
        let mut record = upload("UP1", "ABC123", Some("AN1"));
        UploadRepository::create(&store, &record).await.unwrap();

        record.replace_payload("{\"v\":2}".to_string());
        assert_eq!(UploadRepository::update(&store, &record).await.unwrap(), 1);

        let stale = store
            .record_validation("UP1", "{}", UploadState::Validated, &[], None)
            .await
            .unwrap();
        assert_eq!(stale, 0);

        let current = store
            .record_validation("UP1", "{\"v\":2}", UploadState::Validated, &[], None)
            .await
            .unwrap();
        assert_eq!(current, 1);

        let again = store
            .record_validation("UP1", "{\"v\":2}", UploadState::ValidationError, &[], None)
            .await
            .unwrap();
        assert_eq!(again, 0);
        let stored = UploadRepository::read(&store, "UP1").await.unwrap().unwrap();
        assert_eq!(stored.state, UploadState::Validated);
    }

    #[tokio::test]
    async fn test_concurrent_registrations_never_reuse_versions() {
        let store = InMemoryStore::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .register("variantCall", &json!({"title": i}))
                    .await
                    .unwrap()
                    .version
            }));
        }
        let mut versions = HashSet::new();
        for handle in handles {
            versions.insert(handle.await.unwrap());
        }
        assert_eq!(versions, (1..=16).collect::<HashSet<i32>>());

        let latest = AnalysisTypeRepository::read(&store, "variantCall", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.version, 16);
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_pages() {
        let store = InMemoryStore::new();
        for name in ["alpha", "beta", "alpha", "gamma", "beta", "alpha"] {
            store.register(name, &json!({})).await.unwrap();
        }

        let query = AnalysisTypeQuery {
            names: vec!["alpha".to_string(), "beta".to_string()],
            ..AnalysisTypeQuery::default()
        };
        let (items, total) = store.list(&query).await.unwrap();
        assert_eq!(total, 5);
        let keys: Vec<(String, i32)> = items.iter().map(|t| (t.name.clone(), t.version)).collect();
        assert_eq!(
            keys,
            vec![
                ("alpha".to_string(), 3),
                ("alpha".to_string(), 2),
                ("beta".to_string(), 2),
                ("alpha".to_string(), 1),
                ("beta".to_string(), 1),
            ]
        );

        let query = AnalysisTypeQuery {
            sort_orders: vec![AnalysisTypeSortOrder::Name, AnalysisTypeSortOrder::Version],
            sort_direction: SortDirection::Asc,
            versions: vec![1],
            offset: 1,
            limit: 1,
            ..AnalysisTypeQuery::default()
        };
        let (items, total) = store.list(&query).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "beta");
    }

    fn analysis(id: &str) -> Analysis {
        Analysis {
            analysis_id: id.to_string(),
            study_id: "ABC123".to_string(),
            analysis_type: AnalysisTypeKey {
                name: "variantCall".to_string(),
                version: 1,
            },
            analysis_state: AnalysisState::Unpublished,
            info: JsonValue::Null,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn file(object_id: &str, analysis_id: &str, name: &str) -> FileRecord {
        FileRecord {
            object_id: object_id.to_string(),
            analysis_id: analysis_id.to_string(),
            study_id: "ABC123".to_string(),
            file_name: name.to_string(),
            file_size: 10,
            file_md5sum: "0123456789abcdef0123456789abcdef".to_string(),
            file_access: sonata_core::models::AccessType::Controlled,
            file_type: "VCF".to_string(),
            info: JsonValue::Null,
        }
    }

    #[tokio::test]
    async fn test_apply_update_checks_state_and_keeps_absent_fields() {
        let store = InMemoryStore::new();
        let files = [file("FI1", "AN1", "a.vcf")];
        AnalysisRepository::create(&store, &analysis("AN1"), &[], &files)
            .await
            .unwrap();
        let size = FileUpdate {
            file_size: Some(777854),
            ..FileUpdate::default()
        };
        let info = FileUpdate {
            info: Some(json!({"note": "kept"})),
            ..FileUpdate::default()
        };

        assert_eq!(store.apply_update("FI1", &info, false).await.unwrap(), 1);
        assert_eq!(store.apply_update("FI1", &size, true).await.unwrap(), 1);
        let stored = FileRepository::read(&store, "FI1").await.unwrap().unwrap();
        assert_eq!(stored.file_size, 777854);
        assert_eq!(stored.info, json!({"note": "kept"}));

        store
            .update_state("AN1", AnalysisState::Published)
            .await
            .unwrap();
        let refused = FileUpdate {
            file_size: Some(5),
            ..FileUpdate::default()
        };
        assert_eq!(store.apply_update("FI1", &refused, true).await.unwrap(), 0);
        assert_eq!(
            store.apply_update("FI-missing", &info, false).await.unwrap(),
            0
        );
        let stored = FileRepository::read(&store, "FI1").await.unwrap().unwrap();
        assert_eq!(stored.file_size, 777854);
    }

    #[tokio::test]
    async fn test_colliding_records_are_rejected_without_overwrite() {
        let store = InMemoryStore::new();
        let err = AnalysisRepository::create(
            &store,
            &analysis("AN1"),
            &[],
            &[file("FI1", "AN1", "a.vcf"), file("FI1", "AN1", "a.vcf")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::DuplicateRecord { entity: "file", .. }));
        assert!(AnalysisRepository::read(&store, "AN1").await.unwrap().is_none());

        let files = [file("FI1", "AN1", "a.vcf")];
        AnalysisRepository::create(&store, &analysis("AN1"), &[], &files)
            .await
            .unwrap();
        let taken = [file("FI1", "AN2", "b.vcf")];
        let err = AnalysisRepository::create(&store, &analysis("AN2"), &[], &taken)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateRecord { ref id, .. } if id == "FI1"));
        let renamed = [file("FI2", "AN1", "a.vcf"), file("FI3", "AN1", "a.vcf")];
        let err = store
            .replace_unpublished(&analysis("AN1"), &[], &renamed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateRecord { .. }));
        assert_eq!(store.list_by_analysis("AN1").await.unwrap(), files.to_vec());

        let donor = Donor {
            donor_id: "DO1".to_string(),
            study_id: "ABC123".to_string(),
            submitter_donor_id: "do-1".to_string(),
            gender: "female".to_string(),
            info: JsonValue::Null,
        };
        DonorRepository::create(&store, &donor).await.unwrap();
        let other = Donor {
            gender: "male".to_string(),
            ..donor.clone()
        };
        let err = DonorRepository::create(&store, &other).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateRecord { entity: "donor", .. }));
        assert_eq!(DonorRepository::read(&store, "DO1").await.unwrap(), Some(donor));
    }

    #[tokio::test]
    async fn test_replace_unpublished_refuses_published() {
        let store = InMemoryStore::new();
        let analysis = analysis("AN1");
        AnalysisRepository::create(&store, &analysis, &[], &[])
            .await
            .unwrap();
        assert_eq!(
            store.replace_unpublished(&analysis, &[], &[]).await.unwrap(),
            1
        );

        store
            .update_state("AN1", AnalysisState::Published)
            .await
            .unwrap();
        assert_eq!(
            store.replace_unpublished(&analysis, &[], &[]).await.unwrap(),
            0
        );
    }
}
