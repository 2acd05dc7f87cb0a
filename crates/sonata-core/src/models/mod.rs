//! Data models for the application
//!
//! Organized by domain: studies, uploads, analysis types, analyses (with the
//! donor/specimen/sample graph) and files.

mod analysis;
mod analysis_type;
mod file;
mod study;
mod upload;

pub use analysis::*;
pub use analysis_type::*;
pub use file::*;
pub use study::*;
pub use upload::*;
