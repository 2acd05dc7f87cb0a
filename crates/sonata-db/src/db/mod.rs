//! Database repositories for data access layer
//!
//! Each repository owns one entity of the submission workflow and is defined
//! by a trait in `traits`, with a PostgreSQL implementation next to it and a
//! shared in-memory implementation in `memory`.
//
// Repository contracts
pub mod traits;
//
// PostgreSQL repositories
pub mod analysis;
pub mod analysis_type;
pub mod biospecimen;
pub mod file;
pub mod study;
pub mod upload;
//
// In-memory store implementing every contract
pub mod memory;
//
// Transaction utilities
pub mod transaction;

pub use analysis::PostgresAnalysisRepository;
pub use analysis_type::PostgresAnalysisTypeRepository;
pub use biospecimen::{PostgresDonorRepository, PostgresSampleRepository, PostgresSpecimenRepository};
pub use file::PostgresFileRepository;
pub use memory::InMemoryStore;
pub use study::PostgresStudyRepository;
pub use traits::{
    AnalysisRepository, AnalysisTypeRepository, DonorRepository, FileRepository,
    SampleRepository, SpecimenRepository, StudyRepository, UploadRepository,
};
pub use upload::PostgresUploadRepository;

use sonata_core::AppError;

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Maps a primary key clash on insert to [`AppError::DuplicateRecord`].
pub(crate) fn duplicate_or_database(e: sqlx::Error, entity: &'static str, id: &str) -> AppError {
    if is_unique_violation(&e) {
        AppError::DuplicateRecord {
            entity,
            id: id.to_string(),
        }
    } else {
        AppError::Database(e)
    }
}
