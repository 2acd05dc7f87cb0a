//! Sonata Core Library
//!
//! This crate provides the domain models, error types, configuration, id
//! generation and request validation shared by every sonata component.

pub mod config;
pub mod error;
pub mod ids;
pub mod models;
pub mod schema;
pub mod validation;

// Re-export commonly used types
pub use config::{AnalysisResavePolicy, Config, ValidationMode};
pub use error::{AppError, ErrorKind, ErrorMetadata, LogLevel};
pub use ids::{HashIdGenerator, IdGenerator, IdPrefix};
