use sonata_core::models::{FileUpdateRequest, FileUpdateResponse, FileUpdateType};
use sonata_core::validation::validate_file_update;
use sonata_core::AppError;
use sonata_db::{AnalysisRepository, FileRepository};
use std::sync::Arc;

use super::study::StudyService;

/// Applies partial updates to stored files while their analysis state allows it.
#[derive(Clone)]
pub struct FileModificationService {
    files: Arc<dyn FileRepository>,
    analyses: Arc<dyn AnalysisRepository>,
    studies: StudyService,
}

impl FileModificationService {
    pub fn new(
        files: Arc<dyn FileRepository>,
        analyses: Arc<dyn AnalysisRepository>,
        studies: StudyService,
    ) -> Self {
        Self {
            files,
            analyses,
            studies,
        }
    }

    /// Validate, classify and apply `request` to file `object_id` of `study_id`.
    ///
    /// The request shape is checked before anything is read. Content changes
    /// (size, checksum) are refused unless the owning analysis is UNPUBLISHED;
    /// metadata changes (access, info) go through in every state.
    #[tracing::instrument(skip(self, request))]
    pub async fn secured_apply(
        &self,
        study_id: &str,
        object_id: &str,
        request: &FileUpdateRequest,
    ) -> Result<FileUpdateResponse, AppError> {
        let update = validate_file_update(object_id, request)?;

        self.studies.check_exists(study_id).await?;
        let original = self
            .files
            .read(object_id)
            .await?
            .ok_or_else(|| AppError::FileNotFound(object_id.to_string()))?;
        let analysis = self
            .analyses
            .read(&original.analysis_id)
            .await?
            .ok_or_else(|| AppError::AnalysisIdNotFound(original.analysis_id.clone()))?;

        if original.study_id != study_id || analysis.study_id != study_id {
            tracing::warn!(
                object_id = %object_id,
                study_id = %study_id,
                "File update attempted through an unrelated study"
            );
            return Err(AppError::FileUnrelatedToStudy {
                object_id: object_id.to_string(),
                study_id: study_id.to_string(),
            });
        }

        let update_type = FileUpdateType::classify(&original, &update);
        if !update_type.is_permitted_in(analysis.analysis_state) {
            tracing::debug!(
                object_id = %object_id,
                analysis_state = %analysis.analysis_state,
                "Content update refused"
            );
            return Err(AppError::IllegalFileUpdateRequest {
                object_id: object_id.to_string(),
                analysis_id: original.analysis_id.clone(),
                state: analysis.analysis_state.to_string(),
            });
        }

        let message = if update_type == FileUpdateType::NoUpdate {
            format!(
                "No update for file with objectId '{}' and analysisId '{}'",
                object_id, original.analysis_id
            )
        } else {
            let require_unpublished = update_type == FileUpdateType::ContentUpdate;
            let rows = self
                .files
                .apply_update(object_id, &update, require_unpublished)
                .await?;
            if rows == 0 {
                // The analysis may have been published since it was read.
                if let Some(current) = self.analyses.read(&original.analysis_id).await? {
                    if !update_type.is_permitted_in(current.analysis_state) {
                        return Err(AppError::IllegalFileUpdateRequest {
                            object_id: object_id.to_string(),
                            analysis_id: original.analysis_id.clone(),
                            state: current.analysis_state.to_string(),
                        });
                    }
                }
            }
            AppError::expect_single_row("file", object_id, rows)?;
            tracing::info!(
                object_id = %object_id,
                update_type = %update_type,
                "File updated"
            );
            format!(
                "Updated file with objectId '{}' and analysisId '{}'",
                object_id, original.analysis_id
            )
        };

        Ok(FileUpdateResponse {
            file_update_type: update_type,
            original_analysis_state: analysis.analysis_state,
            unpublished_analysis: false,
            message,
            original_file: original,
        })
    }
}
