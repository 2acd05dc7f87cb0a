//! Validation modules

pub mod file_update;
pub mod names;

pub use file_update::validate_file_update;
pub use names::validate_analysis_type_name;
