use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sonata_core::{
    models::{AnalysisType, AnalysisTypeQuery, AnalysisTypeSortOrder, SortDirection},
    AppError,
};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::traits::AnalysisTypeRepository;
use super::transaction::TransactionGuard;

/// Repository for the versioned analysis type registry
#[derive(Clone)]
pub struct PostgresAnalysisTypeRepository {
    pool: PgPool,
}

impl PostgresAnalysisTypeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &AnalysisTypeQuery) {
    builder.push(" WHERE TRUE");
    if !query.names.is_empty() {
        builder.push(" AND name = ANY(").push_bind(query.names.clone()).push(")");
    }
    if !query.versions.is_empty() {
        builder
            .push(" AND version = ANY(")
            .push_bind(query.versions.clone())
            .push(")");
    }
}

#[async_trait]
impl AnalysisTypeRepository for PostgresAnalysisTypeRepository {
    #[tracing::instrument(skip(self, schema), fields(db.table = "analysis_type", db.operation = "insert"))]
    async fn register(&self, name: &str, schema: &JsonValue) -> Result<AnalysisType, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;
        tx.advisory_lock(&format!("analysis_type:{}", name)).await?;

        let next_version = sqlx::query_scalar::<Postgres, i32>(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM analysis_type WHERE name = $1",
        )
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;

        let analysis_type = sqlx::query_as::<Postgres, AnalysisType>(
            r#"
            INSERT INTO analysis_type (name, version, schema)
            VALUES ($1, $2, $3)
            RETURNING name, version, schema, created_at
            "#,
        )
        .bind(name)
        .bind(next_version)
        .bind(schema)
        .fetch_one(&mut **tx)
        .await?;

        tx.commit().await?;

        Ok(analysis_type)
    }

    #[tracing::instrument(skip(self), fields(db.table = "analysis_type", db.operation = "select"))]
    async fn read(
        &self,
        name: &str,
        version: Option<i32>,
    ) -> Result<Option<AnalysisType>, AppError> {
        let analysis_type = match version {
            Some(version) => {
                sqlx::query_as::<Postgres, AnalysisType>(
                    "SELECT name, version, schema, created_at FROM analysis_type WHERE name = $1 AND version = $2",
                )
                .bind(name)
                .bind(version)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<Postgres, AnalysisType>(
                    "SELECT name, version, schema, created_at FROM analysis_type WHERE name = $1 ORDER BY version DESC LIMIT 1",
                )
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(analysis_type)
    }

    #[tracing::instrument(skip(self), fields(db.table = "analysis_type", db.operation = "select"))]
    async fn list(
        &self,
        query: &AnalysisTypeQuery,
    ) -> Result<(Vec<AnalysisType>, i64), AppError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM analysis_type");
        push_filters(&mut count, query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::<Postgres>::new(
            "SELECT name, version, schema, created_at FROM analysis_type",
        );
        push_filters(&mut select, query);

        let direction = match query.sort_direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        let order: Vec<String> = query
            .effective_sort_orders()
            .iter()
            .map(|order| match order {
                AnalysisTypeSortOrder::Name => format!("name {}", direction),
                AnalysisTypeSortOrder::Version => format!("version {}", direction),
            })
            .collect();
        select.push(" ORDER BY ").push(order.join(", "));
        // Stable tiebreak so pages never overlap.
        select.push(", name ASC, version ASC");
        select.push(" LIMIT ").push_bind(query.limit);
        select.push(" OFFSET ").push_bind(query.offset);

        let items = select
            .build_query_as::<AnalysisType>()
            .fetch_all(&self.pool)
            .await?;

        Ok((items, total))
    }
}
