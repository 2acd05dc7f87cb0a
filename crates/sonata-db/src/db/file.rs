use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sonata_core::{
    models::{AnalysisState, FileRecord, FileUpdate},
    AppError,
};
use sqlx::{PgPool, Postgres};

use super::traits::FileRepository;
use super::transaction::TransactionGuard;

const FILE_COLUMNS: &str = "object_id, analysis_id, study_id, file_name, file_size, file_md5sum, file_access, file_type, info";

/// Repository for analysis files
#[derive(Clone)]
pub struct PostgresFileRepository {
    pool: PgPool,
}

impl PostgresFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for PostgresFileRepository {
    #[tracing::instrument(skip(self), fields(db.table = "file", db.operation = "select", db.record_id = %object_id))]
    async fn read(&self, object_id: &str) -> Result<Option<FileRecord>, AppError> {
        let file = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {} FROM file WHERE object_id = $1",
            FILE_COLUMNS
        ))
        .bind(object_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    #[tracing::instrument(skip(self, update), fields(db.table = "file", db.operation = "update", db.record_id = %object_id))]
    async fn apply_update(
        &self,
        object_id: &str,
        update: &FileUpdate,
        require_unpublished: bool,
    ) -> Result<u64, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        // FOR SHARE holds off a concurrent state change of the analysis until commit.
        let analysis_state: Option<String> = sqlx::query_scalar(
            r#"
            SELECT a.analysis_state
            FROM file f
            JOIN analysis a ON a.analysis_id = f.analysis_id
            WHERE f.object_id = $1
            FOR SHARE OF a
            "#,
        )
        .bind(object_id)
        .fetch_optional(&mut **tx)
        .await?;

        let permitted = match analysis_state.as_deref() {
            Some(state) => !require_unpublished || state == AnalysisState::Unpublished.as_str(),
            None => false,
        };
        if !permitted {
            tx.rollback().await?;
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE file
            SET file_size = COALESCE($2, file_size),
                file_md5sum = COALESCE($3, file_md5sum),
                file_access = COALESCE($4, file_access),
                info = CASE WHEN $5 THEN $6 ELSE info END
            WHERE object_id = $1
            "#,
        )
        .bind(object_id)
        .bind(update.file_size)
        .bind(update.file_md5sum.as_deref())
        .bind(update.file_access.map(|access| access.as_str()))
        .bind(update.info.is_some())
        .bind(update.info.clone().unwrap_or(JsonValue::Null))
        .execute(&mut **tx)
        .await?;

        tx.commit().await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "file", db.operation = "select"))]
    async fn list_by_analysis(&self, analysis_id: &str) -> Result<Vec<FileRecord>, AppError> {
        let files = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {} FROM file WHERE analysis_id = $1 ORDER BY file_name",
            FILE_COLUMNS
        ))
        .bind(analysis_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }
}
