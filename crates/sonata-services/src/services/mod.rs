pub mod analysis;
pub mod analysis_type;
pub mod file_modification;
pub mod id_resolver;
pub mod schema_validator;
pub mod study;
pub mod upload;
pub mod validation;

pub use analysis::{AnalysisService, AnalysisStores};
pub use analysis_type::AnalysisTypeService;
pub use file_modification::FileModificationService;
pub use id_resolver::{BusinessKey, IdResolver, IdStrategy, Resolution};
pub use schema_validator::{JsonSchemaValidator, SchemaValidator, SchemaViolation};
pub use study::StudyService;
pub use upload::UploadService;
pub use validation::{ValidationOutcome, ValidationService};
