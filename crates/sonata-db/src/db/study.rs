use async_trait::async_trait;
use sonata_core::{models::Study, AppError};
use sqlx::{PgPool, Postgres};

use super::is_unique_violation;
use super::traits::StudyRepository;

/// Repository for studies
#[derive(Clone)]
pub struct PostgresStudyRepository {
    pool: PgPool,
}

impl PostgresStudyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StudyRepository for PostgresStudyRepository {
    #[tracing::instrument(skip(self, study), fields(db.table = "study", db.operation = "insert", db.record_id = %study.study_id))]
    async fn create(&self, study: &Study) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO study (study_id, name, organization, description, info, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&study.study_id)
        .bind(&study.name)
        .bind(&study.organization)
        .bind(&study.description)
        .bind(&study.info)
        .bind(study.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::StudyAlreadyExists(study.study_id.clone())
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "study", db.operation = "select", db.record_id = %study_id))]
    async fn read(&self, study_id: &str) -> Result<Option<Study>, AppError> {
        let study = sqlx::query_as::<Postgres, Study>(
            "SELECT study_id, name, organization, description, info, created_at FROM study WHERE study_id = $1",
        )
        .bind(study_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(study)
    }

    #[tracing::instrument(skip(self), fields(db.table = "study", db.operation = "select", db.record_id = %study_id))]
    async fn exists(&self, study_id: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<Postgres, bool>(
            "SELECT EXISTS(SELECT 1 FROM study WHERE study_id = $1)",
        )
        .bind(study_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
