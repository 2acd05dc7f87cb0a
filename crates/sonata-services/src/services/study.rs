use chrono::Utc;
use sonata_core::models::{CreateStudyRequest, Study};
use sonata_core::AppError;
use sonata_db::StudyRepository;
use std::sync::Arc;
use validator::Validate;

#[derive(Clone)]
pub struct StudyService {
    repository: Arc<dyn StudyRepository>,
}

impl StudyService {
    pub fn new(repository: Arc<dyn StudyRepository>) -> Self {
        Self { repository }
    }

    #[tracing::instrument(skip(self, request), fields(study_id = %request.study_id))]
    pub async fn create(&self, request: CreateStudyRequest) -> Result<Study, AppError> {
        request.validate()?;

        let study = Study {
            study_id: request.study_id,
            name: request.name,
            organization: request.organization,
            description: request.description,
            info: request.info,
            created_at: Utc::now(),
        };
        self.repository.create(&study).await?;

        tracing::info!(study_id = %study.study_id, "Study created");
        Ok(study)
    }

    pub async fn read(&self, study_id: &str) -> Result<Study, AppError> {
        self.repository
            .read(study_id)
            .await?
            .ok_or_else(|| AppError::StudyIdDoesNotExist(study_id.to_string()))
    }

    pub async fn exists(&self, study_id: &str) -> Result<bool, AppError> {
        self.repository.exists(study_id).await
    }

    /// Fail with `StudyIdDoesNotExist` unless the study exists.
    pub async fn check_exists(&self, study_id: &str) -> Result<(), AppError> {
        if self.exists(study_id).await? {
            Ok(())
        } else {
            tracing::debug!(study_id = %study_id, "Rejected request for unknown study");
            Err(AppError::StudyIdDoesNotExist(study_id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sonata_db::InMemoryStore;

    fn service() -> StudyService {
        StudyService::new(Arc::new(InMemoryStore::new()))
    }

    fn request(study_id: &str) -> CreateStudyRequest {
        serde_json::from_value(json!({"studyId": study_id, "name": "Pilot"})).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_check() {
        let studies = service();
        studies.create(request("ABC123")).await.unwrap();

        assert!(studies.exists("ABC123").await.unwrap());
        studies.check_exists("ABC123").await.unwrap();
        assert_eq!(
            studies.read("ABC123").await.unwrap().name.as_deref(),
            Some("Pilot")
        );
    }

    #[tokio::test]
    async fn test_unknown_study_is_not_found() {
        let err = service().check_exists("NOPE").await.unwrap_err();
        assert!(matches!(err, AppError::StudyIdDoesNotExist(ref id) if id == "NOPE"));
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_ids_are_rejected() {
        let studies = service();
        studies.create(request("ABC123")).await.unwrap();

        let err = studies.create(request("ABC123")).await.unwrap_err();
        assert!(matches!(err, AppError::StudyAlreadyExists(_)));

        let err = studies.create(request("")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
