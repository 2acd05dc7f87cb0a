//! Sonata Services Layer
//!
//! Business services for the submission workflow: study checks, the analysis
//! type registry, upload ingestion with schema validation, analysis save and
//! the file update classifier. `ServiceContext` wires them over either the
//! PostgreSQL repositories or the in-memory store.

pub mod context;
pub mod services;
pub mod telemetry;

pub use context::{Repositories, ServiceContext};
pub use services::{
    AnalysisService, AnalysisStores, AnalysisTypeService, BusinessKey, FileModificationService,
    IdResolver, IdStrategy, JsonSchemaValidator, Resolution, SchemaValidator, SchemaViolation,
    StudyService, UploadService, ValidationOutcome, ValidationService,
};
