//! Donor, specimen and sample repositories.
//!
//! Each entity is keyed by `(study_id, submitter id)`; the unique constraint on
//! that pair is what makes lookup-or-create safe under concurrent saves.

use async_trait::async_trait;
use sonata_core::{
    models::{Donor, Sample, Specimen},
    AppError,
};
use sqlx::{PgPool, Postgres};

use super::traits::{DonorRepository, SampleRepository, SpecimenRepository};

#[derive(Clone)]
pub struct PostgresDonorRepository {
    pool: PgPool,
}

impl PostgresDonorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DonorRepository for PostgresDonorRepository {
    #[tracing::instrument(skip(self, donor), fields(db.table = "donor", db.operation = "insert", db.record_id = %donor.donor_id))]
    async fn create(&self, donor: &Donor) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO donor (donor_id, study_id, submitter_donor_id, gender, info)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&donor.donor_id)
        .bind(&donor.study_id)
        .bind(&donor.submitter_donor_id)
        .bind(&donor.gender)
        .bind(&donor.info)
        .execute(&self.pool)
        .await
        .map_err(|e| super::duplicate_or_database(e, "donor", &donor.donor_id))?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "donor", db.operation = "select", db.record_id = %donor_id))]
    async fn read(&self, donor_id: &str) -> Result<Option<Donor>, AppError> {
        let donor = sqlx::query_as::<Postgres, Donor>(
            "SELECT donor_id, study_id, submitter_donor_id, gender, info FROM donor WHERE donor_id = $1",
        )
        .bind(donor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(donor)
    }

    #[tracing::instrument(skip(self, donor), fields(db.table = "donor", db.operation = "update", db.record_id = %donor.donor_id))]
    async fn update(&self, donor: &Donor) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE donor SET gender = $2, info = $3 WHERE donor_id = $1")
            .bind(&donor.donor_id)
            .bind(&donor.gender)
            .bind(&donor.info)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "donor", db.operation = "select"))]
    async fn find_by_business_key(
        &self,
        study_id: &str,
        submitter_donor_id: &str,
    ) -> Result<Vec<Donor>, AppError> {
        let donors = sqlx::query_as::<Postgres, Donor>(
            "SELECT donor_id, study_id, submitter_donor_id, gender, info FROM donor WHERE study_id = $1 AND submitter_donor_id = $2",
        )
        .bind(study_id)
        .bind(submitter_donor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(donors)
    }
}

#[derive(Clone)]
pub struct PostgresSpecimenRepository {
    pool: PgPool,
}

impl PostgresSpecimenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SpecimenRepository for PostgresSpecimenRepository {
    #[tracing::instrument(skip(self, specimen), fields(db.table = "specimen", db.operation = "insert", db.record_id = %specimen.specimen_id))]
    async fn create(&self, specimen: &Specimen) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO specimen (
                specimen_id, donor_id, study_id, submitter_specimen_id, specimen_type,
                tissue_source, info
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&specimen.specimen_id)
        .bind(&specimen.donor_id)
        .bind(&specimen.study_id)
        .bind(&specimen.submitter_specimen_id)
        .bind(&specimen.specimen_type)
        .bind(&specimen.tissue_source)
        .bind(&specimen.info)
        .execute(&self.pool)
        .await
        .map_err(|e| super::duplicate_or_database(e, "specimen", &specimen.specimen_id))?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "specimen", db.operation = "select", db.record_id = %specimen_id))]
    async fn read(&self, specimen_id: &str) -> Result<Option<Specimen>, AppError> {
        let specimen = sqlx::query_as::<Postgres, Specimen>(
            "SELECT specimen_id, donor_id, study_id, submitter_specimen_id, specimen_type, tissue_source, info FROM specimen WHERE specimen_id = $1",
        )
        .bind(specimen_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(specimen)
    }

    #[tracing::instrument(skip(self, specimen), fields(db.table = "specimen", db.operation = "update", db.record_id = %specimen.specimen_id))]
    async fn update(&self, specimen: &Specimen) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE specimen
            SET donor_id = $2, specimen_type = $3, tissue_source = $4, info = $5
            WHERE specimen_id = $1
            "#,
        )
        .bind(&specimen.specimen_id)
        .bind(&specimen.donor_id)
        .bind(&specimen.specimen_type)
        .bind(&specimen.tissue_source)
        .bind(&specimen.info)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "specimen", db.operation = "select"))]
    async fn find_by_business_key(
        &self,
        study_id: &str,
        submitter_specimen_id: &str,
    ) -> Result<Vec<Specimen>, AppError> {
        let specimens = sqlx::query_as::<Postgres, Specimen>(
            "SELECT specimen_id, donor_id, study_id, submitter_specimen_id, specimen_type, tissue_source, info FROM specimen WHERE study_id = $1 AND submitter_specimen_id = $2",
        )
        .bind(study_id)
        .bind(submitter_specimen_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(specimens)
    }
}

#[derive(Clone)]
pub struct PostgresSampleRepository {
    pool: PgPool,
}

impl PostgresSampleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SampleRepository for PostgresSampleRepository {
    #[tracing::instrument(skip(self, sample), fields(db.table = "sample", db.operation = "insert", db.record_id = %sample.sample_id))]
    async fn create(&self, sample: &Sample) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sample (
                sample_id, specimen_id, study_id, submitter_sample_id, sample_type, info
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&sample.sample_id)
        .bind(&sample.specimen_id)
        .bind(&sample.study_id)
        .bind(&sample.submitter_sample_id)
        .bind(&sample.sample_type)
        .bind(&sample.info)
        .execute(&self.pool)
        .await
        .map_err(|e| super::duplicate_or_database(e, "sample", &sample.sample_id))?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "sample", db.operation = "select", db.record_id = %sample_id))]
    async fn read(&self, sample_id: &str) -> Result<Option<Sample>, AppError> {
        let sample = sqlx::query_as::<Postgres, Sample>(
            "SELECT sample_id, specimen_id, study_id, submitter_sample_id, sample_type, info FROM sample WHERE sample_id = $1",
        )
        .bind(sample_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sample)
    }

    #[tracing::instrument(skip(self, sample), fields(db.table = "sample", db.operation = "update", db.record_id = %sample.sample_id))]
    async fn update(&self, sample: &Sample) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE sample SET specimen_id = $2, sample_type = $3, info = $4 WHERE sample_id = $1",
        )
        .bind(&sample.sample_id)
        .bind(&sample.specimen_id)
        .bind(&sample.sample_type)
        .bind(&sample.info)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "sample", db.operation = "select"))]
    async fn find_by_business_key(
        &self,
        study_id: &str,
        submitter_sample_id: &str,
    ) -> Result<Vec<Sample>, AppError> {
        let samples = sqlx::query_as::<Postgres, Sample>(
            "SELECT sample_id, specimen_id, study_id, submitter_sample_id, sample_type, info FROM sample WHERE study_id = $1 AND submitter_sample_id = $2",
        )
        .bind(study_id)
        .bind(submitter_sample_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(samples)
    }
}
