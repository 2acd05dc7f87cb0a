//! Sonata DB Library
//!
//! Repository traits and their PostgreSQL and in-memory implementations for
//! studies, uploads, analysis types, analyses, biospecimens and files.

pub mod db;
pub mod setup;

pub use db::*;
pub use db::transaction::TransactionGuard;
pub use setup::setup_database;
