//! Analysis type registry.
//!
//! Types are append-only: registering an existing name stores a new version,
//! and stored schemas are never rewritten. Reads hand out the rendered schema
//! (base analysis schema combined with the stored one) unless the caller asks
//! for the stored form.

use serde_json::Value;
use sonata_core::models::{AnalysisType, AnalysisTypeKey, AnalysisTypeQuery, AnalysisTypeRef, Page};
use sonata_core::validation::validate_analysis_type_name;
use sonata_core::{schema, AppError};
use sonata_db::AnalysisTypeRepository;
use std::sync::Arc;
use validator::Validate;

use super::schema_validator::SchemaValidator;

#[derive(Clone)]
pub struct AnalysisTypeService {
    repository: Arc<dyn AnalysisTypeRepository>,
    validator: Arc<dyn SchemaValidator>,
}

impl AnalysisTypeService {
    pub fn new(
        repository: Arc<dyn AnalysisTypeRepository>,
        validator: Arc<dyn SchemaValidator>,
    ) -> Self {
        Self {
            repository,
            validator,
        }
    }

    #[tracing::instrument(skip(self, schema))]
    pub async fn register(&self, name: &str, schema: Value) -> Result<AnalysisTypeKey, AppError> {
        validate_analysis_type_name(name)?;
        schema::ensure_schema_object(&schema)?;
        self.validator.check_schema(&schema)?;
        self.validator
            .check_schema(&schema::render(Some(&schema)))?;

        let registered = self.repository.register(name, &schema).await?;

        tracing::info!(
            name = %registered.name,
            version = registered.version,
            "Analysis type registered"
        );
        Ok(registered.key())
    }

    /// `version: None` resolves the latest version of `name`.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(
        &self,
        name: &str,
        version: Option<i32>,
        unrendered_only: bool,
    ) -> Result<AnalysisType, AppError> {
        let mut analysis_type = self
            .repository
            .read(name, version)
            .await?
            .ok_or_else(|| {
                AppError::AnalysisTypeNotFound(match version {
                    Some(version) => format!("{}:{}", name, version),
                    None => name.to_string(),
                })
            })?;

        if !unrendered_only {
            analysis_type.schema = Some(schema::render(analysis_type.schema.as_ref()));
        }
        Ok(analysis_type)
    }

    pub async fn resolve_ref(
        &self,
        type_ref: &AnalysisTypeRef,
        unrendered_only: bool,
    ) -> Result<AnalysisType, AppError> {
        self.resolve(type_ref.name(), type_ref.version(), unrendered_only)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, query: &AnalysisTypeQuery) -> Result<Page<AnalysisType>, AppError> {
        query.validate()?;

        let (items, count) = self.repository.list(query).await?;
        let items = items
            .into_iter()
            .map(|mut analysis_type| {
                analysis_type.schema = if query.hide_schema {
                    None
                } else if query.unrendered_only {
                    analysis_type.schema
                } else {
                    Some(schema::render(analysis_type.schema.as_ref()))
                };
                analysis_type
            })
            .collect();

        Ok(Page {
            items,
            offset: query.offset,
            limit: query.limit,
            count,
        })
    }
}
