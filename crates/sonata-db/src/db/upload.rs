use async_trait::async_trait;
use sonata_core::{
    models::{AnalysisTypeKey, UploadRecord, UploadState},
    AppError,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};

use super::is_unique_violation;
use super::traits::UploadRepository;

const UPLOAD_COLUMNS: &str = "upload_id, study_id, analysis_id, state, payload, replaced_payload, errors, validated_type_name, validated_type_version, created_at, updated_at";

/// Repository for upload records
#[derive(Clone)]
pub struct PostgresUploadRepository {
    pool: PgPool,
}

impl PostgresUploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UploadRepository for PostgresUploadRepository {
    #[tracing::instrument(skip(self, upload), fields(db.table = "upload", db.operation = "insert", db.record_id = %upload.upload_id))]
    async fn create(&self, upload: &UploadRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO upload (
                upload_id, study_id, analysis_id, state, payload, replaced_payload,
                errors, validated_type_name, validated_type_version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&upload.upload_id)
        .bind(&upload.study_id)
        .bind(&upload.analysis_id)
        .bind(upload.state.as_str())
        .bind(&upload.payload)
        .bind(&upload.replaced_payload)
        .bind(Json(&upload.errors))
        .bind(upload.validated_type.as_ref().map(|key| key.name.as_str()))
        .bind(upload.validated_type.as_ref().map(|key| key.version))
        .bind(upload.created_at)
        .bind(upload.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &upload.analysis_id {
            Some(analysis_id) if is_unique_violation(&e) => AppError::UploadConflict {
                study_id: upload.study_id.clone(),
                analysis_id: analysis_id.clone(),
            },
            _ => AppError::Database(e),
        })?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload", db.operation = "select", db.record_id = %upload_id))]
    async fn read(&self, upload_id: &str) -> Result<Option<UploadRecord>, AppError> {
        let upload = sqlx::query_as::<Postgres, UploadRecord>(&format!(
            "SELECT {} FROM upload WHERE upload_id = $1",
            UPLOAD_COLUMNS
        ))
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(upload)
    }

    #[tracing::instrument(skip(self, upload), fields(db.table = "upload", db.operation = "update", db.record_id = %upload.upload_id))]
    async fn update(&self, upload: &UploadRecord) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload
            SET analysis_id = $2, state = $3, payload = $4, replaced_payload = $5,
                errors = $6, validated_type_name = $7, validated_type_version = $8,
                updated_at = $9
            WHERE upload_id = $1
            "#,
        )
        .bind(&upload.upload_id)
        .bind(&upload.analysis_id)
        .bind(upload.state.as_str())
        .bind(&upload.payload)
        .bind(&upload.replaced_payload)
        .bind(Json(&upload.errors))
        .bind(upload.validated_type.as_ref().map(|key| key.name.as_str()))
        .bind(upload.validated_type.as_ref().map(|key| key.version))
        .bind(upload.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self, payload, errors, validated_type), fields(db.table = "upload", db.operation = "update", db.record_id = %upload_id))]
    async fn record_validation(
        &self,
        upload_id: &str,
        payload: &str,
        state: UploadState,
        errors: &[String],
        validated_type: Option<&AnalysisTypeKey>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload
            SET state = $3, errors = $4, validated_type_name = $5, validated_type_version = $6,
                updated_at = NOW()
            WHERE upload_id = $1 AND payload = $2 AND state IN ('CREATED', 'UPDATED')
            "#,
        )
        .bind(upload_id)
        .bind(payload)
        .bind(state.as_str())
        .bind(Json(errors))
        .bind(validated_type.map(|key| key.name.as_str()))
        .bind(validated_type.map(|key| key.version))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self, payload), fields(db.table = "upload", db.operation = "update", db.record_id = %upload_id))]
    async fn mark_saved(
        &self,
        upload_id: &str,
        payload: &str,
        retain_replaced: bool,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload
            SET state = 'SAVED', errors = '[]'::jsonb, updated_at = NOW(),
                replaced_payload = CASE WHEN $3 THEN replaced_payload ELSE NULL END
            WHERE upload_id = $1 AND payload = $2 AND state IN ('VALIDATED', 'SAVED')
            "#,
        )
        .bind(upload_id)
        .bind(payload)
        .bind(retain_replaced)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload", db.operation = "delete", db.record_id = %upload_id))]
    async fn delete(&self, upload_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM upload WHERE upload_id = $1")
            .bind(upload_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload", db.operation = "select"))]
    async fn find_by_business_key(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> Result<Vec<UploadRecord>, AppError> {
        let uploads = sqlx::query_as::<Postgres, UploadRecord>(&format!(
            "SELECT {} FROM upload WHERE study_id = $1 AND analysis_id = $2",
            UPLOAD_COLUMNS
        ))
        .bind(study_id)
        .bind(analysis_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(uploads)
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload", db.operation = "select"))]
    async fn list_by_study(
        &self,
        study_id: &str,
        state: Option<UploadState>,
    ) -> Result<Vec<UploadRecord>, AppError> {
        let uploads = sqlx::query_as::<Postgres, UploadRecord>(&format!(
            "SELECT {} FROM upload WHERE study_id = $1 AND ($2::text IS NULL OR state = $2) ORDER BY created_at ASC, upload_id ASC",
            UPLOAD_COLUMNS
        ))
        .bind(study_id)
        .bind(state.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(uploads)
    }
}
