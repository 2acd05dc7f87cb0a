use async_trait::async_trait;
use chrono::Utc;
use sonata_core::{
    models::{Analysis, AnalysisState, FileRecord},
    AppError,
};
use sqlx::{PgConnection, PgPool, Postgres};

use super::traits::AnalysisRepository;
use super::transaction::TransactionGuard;

const ANALYSIS_COLUMNS: &str = "analysis_id, study_id, analysis_type_name, analysis_type_version, analysis_state, info, created_at, updated_at";

/// Repository for analyses together with their sample links and files
#[derive(Clone)]
pub struct PostgresAnalysisRepository {
    pool: PgPool,
}

impl PostgresAnalysisRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_sample_links(
    conn: &mut PgConnection,
    analysis_id: &str,
    sample_ids: &[String],
) -> Result<(), AppError> {
    for sample_id in sample_ids {
        sqlx::query(
            "INSERT INTO analysis_sample (analysis_id, sample_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(analysis_id)
        .bind(sample_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_files(conn: &mut PgConnection, files: &[FileRecord]) -> Result<(), AppError> {
    for file in files {
        sqlx::query(
            r#"
            INSERT INTO file (
                object_id, analysis_id, study_id, file_name, file_size, file_md5sum,
                file_access, file_type, info
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&file.object_id)
        .bind(&file.analysis_id)
        .bind(&file.study_id)
        .bind(&file.file_name)
        .bind(file.file_size)
        .bind(&file.file_md5sum)
        .bind(file.file_access.as_str())
        .bind(&file.file_type)
        .bind(&file.info)
        .execute(&mut *conn)
        .await
        .map_err(|e| super::duplicate_or_database(e, "file", &file.object_id))?;
    }
    Ok(())
}

#[async_trait]
impl AnalysisRepository for PostgresAnalysisRepository {
    #[tracing::instrument(skip(self, analysis, sample_ids, files), fields(db.table = "analysis", db.operation = "insert", db.record_id = %analysis.analysis_id))]
    async fn create(
        &self,
        analysis: &Analysis,
        sample_ids: &[String],
        files: &[FileRecord],
    ) -> Result<(), AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        sqlx::query(
            r#"
            INSERT INTO analysis (
                analysis_id, study_id, analysis_type_name, analysis_type_version,
                analysis_state, info, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&analysis.analysis_id)
        .bind(&analysis.study_id)
        .bind(&analysis.analysis_type.name)
        .bind(analysis.analysis_type.version)
        .bind(analysis.analysis_state.as_str())
        .bind(&analysis.info)
        .bind(analysis.created_at)
        .bind(analysis.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if super::is_unique_violation(&e) {
                AppError::DuplicateAnalysisAttempt(analysis.analysis_id.clone())
            } else {
                AppError::Database(e)
            }
        })?;

        insert_sample_links(&mut **tx, &analysis.analysis_id, sample_ids).await?;
        insert_files(&mut **tx, files).await?;

        tx.commit().await?;

        tracing::debug!(
            analysis_id = %analysis.analysis_id,
            samples = sample_ids.len(),
            files = files.len(),
            "Analysis graph inserted"
        );

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "analysis", db.operation = "select", db.record_id = %analysis_id))]
    async fn read(&self, analysis_id: &str) -> Result<Option<Analysis>, AppError> {
        let analysis = sqlx::query_as::<Postgres, Analysis>(&format!(
            "SELECT {} FROM analysis WHERE analysis_id = $1",
            ANALYSIS_COLUMNS
        ))
        .bind(analysis_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(analysis)
    }

    #[tracing::instrument(skip(self, analysis, sample_ids, files), fields(db.table = "analysis", db.operation = "update", db.record_id = %analysis.analysis_id))]
    async fn replace_unpublished(
        &self,
        analysis: &Analysis,
        sample_ids: &[String],
        files: &[FileRecord],
    ) -> Result<u64, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        let updated = sqlx::query(
            r#"
            UPDATE analysis
            SET analysis_type_name = $2, analysis_type_version = $3, info = $4, updated_at = $5
            WHERE analysis_id = $1 AND analysis_state = 'UNPUBLISHED'
            "#,
        )
        .bind(&analysis.analysis_id)
        .bind(&analysis.analysis_type.name)
        .bind(analysis.analysis_type.version)
        .bind(&analysis.info)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(0);
        }

        sqlx::query("DELETE FROM analysis_sample WHERE analysis_id = $1")
            .bind(&analysis.analysis_id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM file WHERE analysis_id = $1")
            .bind(&analysis.analysis_id)
            .execute(&mut **tx)
            .await?;

        insert_sample_links(&mut **tx, &analysis.analysis_id, sample_ids).await?;
        insert_files(&mut **tx, files).await?;

        tx.commit().await?;

        Ok(updated)
    }

    #[tracing::instrument(skip(self), fields(db.table = "analysis", db.operation = "update", db.record_id = %analysis_id))]
    async fn update_state(
        &self,
        analysis_id: &str,
        state: AnalysisState,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE analysis SET analysis_state = $2, updated_at = NOW() WHERE analysis_id = $1",
        )
        .bind(analysis_id)
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "analysis_sample", db.operation = "select", db.record_id = %analysis_id))]
    async fn sample_ids(&self, analysis_id: &str) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<Postgres, String>(
            "SELECT sample_id FROM analysis_sample WHERE analysis_id = $1 ORDER BY sample_id",
        )
        .bind(analysis_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
