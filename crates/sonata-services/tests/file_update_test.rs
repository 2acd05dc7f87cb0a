#[path = "helpers/mod.rs"]
mod helpers;

use async_trait::async_trait;
use helpers::fixtures::{payload_text, REFERENCE_MD5, REFERENCE_SIZE};
use helpers::{setup_test_context, submit_analysis, OTHER_STUDY_ID, STUDY_ID};
use serde_json::json;
use sonata_core::models::{
    AccessType, Analysis, AnalysisState, FileRecord, FileUpdateRequest, FileUpdateType,
};
use sonata_core::AppError;
use sonata_db::AnalysisRepository;
use sonata_services::{FileModificationService, ServiceContext};
use std::sync::Arc;

/// Saves an analysis in `state` and returns its only file.
async fn stored_file(ctx: &ServiceContext, analysis_id: &str, state: AnalysisState) -> FileRecord {
    submit_analysis(ctx, &payload_text(Some(analysis_id))).await;
    if state != AnalysisState::Unpublished {
        ctx.analyses
            .update_state(STUDY_ID, analysis_id, state)
            .await
            .unwrap();
    }
    let mut files = ctx.analyses.read_files(STUDY_ID, analysis_id).await.unwrap();
    assert_eq!(files.len(), 1);
    files.remove(0)
}

fn request(body: serde_json::Value) -> FileUpdateRequest {
    serde_json::from_value(body).unwrap()
}

async fn current(ctx: &ServiceContext, object_id: &str) -> FileRecord {
    ctx.repositories
        .files
        .read(object_id)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_size_change_on_unpublished_analysis_is_a_content_update() {
    let ctx = setup_test_context().await;
    let file = stored_file(&ctx, "AN-F1", AnalysisState::Unpublished).await;
    assert_eq!(file.file_size, REFERENCE_SIZE);

    let response = ctx
        .files
        .secured_apply(STUDY_ID, &file.object_id, &request(json!({"fileSize": 777854})))
        .await
        .unwrap();

    assert_eq!(response.file_update_type, FileUpdateType::ContentUpdate);
    assert_eq!(response.original_analysis_state, AnalysisState::Unpublished);
    assert!(!response.unpublished_analysis);
    assert_eq!(response.original_file.file_size, REFERENCE_SIZE);
    assert_eq!(current(&ctx, &file.object_id).await.file_size, 777854);
}

#[tokio::test]
async fn test_content_update_on_published_analysis_is_refused() {
    let ctx = setup_test_context().await;
    let file = stored_file(&ctx, "AN-F2", AnalysisState::Published).await;

    let err = ctx
        .files
        .secured_apply(STUDY_ID, &file.object_id, &request(json!({"fileSize": 777854})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::IllegalFileUpdateRequest { ref state, .. } if state == "PUBLISHED"));

    let err = ctx
        .files
        .secured_apply(
            STUDY_ID,
            &file.object_id,
            &request(json!({"fileMd5sum": "ffffffffffffffffffffffffffffffff"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::IllegalFileUpdateRequest { .. }));

    assert_eq!(current(&ctx, &file.object_id).await, file);
}

#[tokio::test]
async fn test_malformed_request_is_rejected_before_any_lookup() {
    let ctx = setup_test_context().await;
    let file = stored_file(&ctx, "AN-F3", AnalysisState::Published).await;
    let bad = request(json!({"fileMd5sum": "q123"}));

    let err = ctx
        .files
        .secured_apply(STUDY_ID, &file.object_id, &bad)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidFileUpdateRequest { .. }));

    // Unknown file and unknown study report the request problem, not the lookup.
    let err = ctx
        .files
        .secured_apply("NOPE", "FI-missing", &bad)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidFileUpdateRequest { .. }));

    let err = ctx
        .files
        .secured_apply(STUDY_ID, &file.object_id, &request(json!({"fileSize": 0})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidFileUpdateRequest { .. }));

    let err = ctx
        .files
        .secured_apply(
            STUDY_ID,
            &file.object_id,
            &request(json!({"fileAccess": "secret"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidFileUpdateRequest { .. }));
}

#[tokio::test]
async fn test_metadata_updates_are_allowed_in_every_state() {
    let ctx = setup_test_context().await;

    for (analysis_id, state) in [
        ("AN-F4", AnalysisState::Published),
        ("AN-F5", AnalysisState::Suppressed),
    ] {
        let file = stored_file(&ctx, analysis_id, state).await;
        let response = ctx
            .files
            .secured_apply(
                STUDY_ID,
                &file.object_id,
                &request(json!({"fileAccess": "open", "info": {"note": "relabelled"}})),
            )
            .await
            .unwrap();

        assert_eq!(response.file_update_type, FileUpdateType::MetadataUpdate);
        assert_eq!(response.original_analysis_state, state);

        let stored = current(&ctx, &file.object_id).await;
        assert_eq!(stored.file_access, AccessType::Open);
        assert_eq!(stored.info, json!({"note": "relabelled"}));
        assert_eq!(stored.file_size, REFERENCE_SIZE);
        assert_eq!(stored.file_md5sum, REFERENCE_MD5);
    }
}

#[tokio::test]
async fn test_unchanged_values_are_no_update() {
    let ctx = setup_test_context().await;
    let file = stored_file(&ctx, "AN-F6", AnalysisState::Published).await;

    let response = ctx
        .files
        .secured_apply(STUDY_ID, &file.object_id, &request(json!({})))
        .await
        .unwrap();
    assert_eq!(response.file_update_type, FileUpdateType::NoUpdate);
    assert_eq!(
        response.message,
        format!(
            "No update for file with objectId '{}' and analysisId 'AN-F6'",
            file.object_id
        )
    );

    let response = ctx
        .files
        .secured_apply(
            STUDY_ID,
            &file.object_id,
            &request(json!({"fileSize": REFERENCE_SIZE, "fileMd5sum": REFERENCE_MD5})),
        )
        .await
        .unwrap();
    assert_eq!(response.file_update_type, FileUpdateType::NoUpdate);
}

#[tokio::test]
async fn test_content_and_metadata_together_is_a_content_update() {
    let ctx = setup_test_context().await;
    let file = stored_file(&ctx, "AN-F7", AnalysisState::Unpublished).await;

    let response = ctx
        .files
        .secured_apply(
            STUDY_ID,
            &file.object_id,
            &request(json!({"fileSize": 12, "fileAccess": "open"})),
        )
        .await
        .unwrap();
    assert_eq!(response.file_update_type, FileUpdateType::ContentUpdate);
    assert_eq!(
        response.message,
        format!(
            "Updated file with objectId '{}' and analysisId 'AN-F7'",
            file.object_id
        )
    );

    let stored = current(&ctx, &file.object_id).await;
    assert_eq!(stored.file_size, 12);
    assert_eq!(stored.file_access, AccessType::Open);
}

#[tokio::test]
async fn test_null_info_clears_the_document() {
    let ctx = setup_test_context().await;
    let file = stored_file(&ctx, "AN-F8", AnalysisState::Published).await;

    let response = ctx
        .files
        .secured_apply(STUDY_ID, &file.object_id, &request(json!({"info": null})))
        .await
        .unwrap();
    assert_eq!(response.file_update_type, FileUpdateType::MetadataUpdate);
    assert_eq!(current(&ctx, &file.object_id).await.info, serde_json::Value::Null);
}

#[tokio::test]
async fn test_file_of_another_study_is_unrelated() {
    let ctx = setup_test_context().await;
    let file = stored_file(&ctx, "AN-F9", AnalysisState::Unpublished).await;

    let err = ctx
        .files
        .secured_apply(OTHER_STUDY_ID, &file.object_id, &request(json!({"fileSize": 5})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::FileUnrelatedToStudy { ref study_id, .. } if study_id == OTHER_STUDY_ID));
    assert_eq!(current(&ctx, &file.object_id).await, file);
}

#[tokio::test]
async fn test_missing_file_and_study_are_not_found() {
    let ctx = setup_test_context().await;
    let update = request(json!({"fileAccess": "open"}));

    let err = ctx
        .files
        .secured_apply(STUDY_ID, "FI-missing", &update)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::FileNotFound(_)));

    let err = ctx
        .files
        .secured_apply("NOPE", "FI-missing", &update)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StudyIdDoesNotExist(_)));
}

/// Publishes every analysis right after it has been read, as a concurrent
/// publish landing between the state check and the file write would.
struct PublishAfterRead {
    inner: Arc<dyn AnalysisRepository>,
}

#[async_trait]
impl AnalysisRepository for PublishAfterRead {
    async fn create(
        &self,
        analysis: &Analysis,
        sample_ids: &[String],
        files: &[FileRecord],
    ) -> Result<(), AppError> {
        self.inner.create(analysis, sample_ids, files).await
    }

    async fn read(&self, analysis_id: &str) -> Result<Option<Analysis>, AppError> {
        let analysis = self.inner.read(analysis_id).await?;
        self.inner
            .update_state(analysis_id, AnalysisState::Published)
            .await?;
        Ok(analysis)
    }

    async fn replace_unpublished(
        &self,
        analysis: &Analysis,
        sample_ids: &[String],
        files: &[FileRecord],
    ) -> Result<u64, AppError> {
        self.inner
            .replace_unpublished(analysis, sample_ids, files)
            .await
    }

    async fn update_state(
        &self,
        analysis_id: &str,
        state: AnalysisState,
    ) -> Result<u64, AppError> {
        self.inner.update_state(analysis_id, state).await
    }

    async fn sample_ids(&self, analysis_id: &str) -> Result<Vec<String>, AppError> {
        self.inner.sample_ids(analysis_id).await
    }
}

#[tokio::test]
async fn test_content_update_racing_a_publish_is_refused() {
    let ctx = setup_test_context().await;
    let file = stored_file(&ctx, "AN-F10", AnalysisState::Unpublished).await;
    let racing = FileModificationService::new(
        ctx.repositories.files.clone(),
        Arc::new(PublishAfterRead {
            inner: ctx.repositories.analyses.clone(),
        }),
        ctx.studies.clone(),
    );

    let err = racing
        .secured_apply(STUDY_ID, &file.object_id, &request(json!({"fileSize": 777854})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::IllegalFileUpdateRequest { ref state, .. } if state == "PUBLISHED"));
    assert_eq!(current(&ctx, &file.object_id).await.file_size, REFERENCE_SIZE);

    // Metadata still goes through once published.
    let response = racing
        .secured_apply(STUDY_ID, &file.object_id, &request(json!({"fileAccess": "open"})))
        .await
        .unwrap();
    assert_eq!(response.file_update_type, FileUpdateType::MetadataUpdate);
    assert_eq!(current(&ctx, &file.object_id).await.file_access, AccessType::Open);
}
