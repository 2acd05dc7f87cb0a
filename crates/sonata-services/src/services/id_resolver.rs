//! Lookup-or-create by business key.
//!
//! Every entity that can be re-submitted (uploads, analyses, donors,
//! specimens, samples) goes through [`IdResolver::resolve`]: look the business
//! key up, hand back the single existing record, or mint the id a new record
//! must be created with.

use sonata_core::{AppError, IdGenerator, IdPrefix};
use std::future::Future;
use std::sync::Arc;

/// How a fresh id is produced when the business key is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// Random id; re-submissions are matched by lookup only.
    Random,
    /// Derived from the key parts, so a re-submission gets the same id.
    Deterministic,
    /// The single key part is the id itself (submitter-chosen ids).
    Verbatim,
}

#[derive(Debug, Clone)]
pub struct BusinessKey<'a> {
    pub entity: &'static str,
    pub prefix: IdPrefix,
    pub parts: &'a [&'a str],
    pub strategy: IdStrategy,
}

impl<'a> BusinessKey<'a> {
    pub fn new(
        entity: &'static str,
        prefix: IdPrefix,
        parts: &'a [&'a str],
        strategy: IdStrategy,
    ) -> Self {
        Self {
            entity,
            prefix,
            parts,
            strategy,
        }
    }

    fn describe(&self) -> String {
        format!("({})", self.parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// Exactly one record holds the key; the caller updates it.
    Existing(T),
    /// Nobody holds the key; the caller creates a record with this id.
    Fresh(String),
}

#[derive(Clone)]
pub struct IdResolver {
    ids: Arc<dyn IdGenerator>,
}

impl IdResolver {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }

    pub fn generate(&self, prefix: IdPrefix) -> String {
        self.ids.generate(prefix)
    }

    pub fn generate_deterministic(&self, prefix: IdPrefix, parts: &[&str]) -> String {
        self.ids.generate_deterministic(prefix, parts)
    }

    fn fresh_id(&self, key: &BusinessKey<'_>) -> Result<String, AppError> {
        match key.strategy {
            IdStrategy::Random => Ok(self.ids.generate(key.prefix)),
            IdStrategy::Deterministic => {
                Ok(self.ids.generate_deterministic(key.prefix, key.parts))
            }
            IdStrategy::Verbatim => match key.parts {
                [id] => Ok(id.to_string()),
                _ => Err(AppError::Internal(format!(
                    "verbatim {} key must have exactly one part, got {}",
                    key.entity,
                    key.parts.len()
                ))),
            },
        }
    }

    /// Run `lookup` for `key` and decide between updating and creating.
    ///
    /// More than one match breaks the uniqueness invariant and fails with
    /// `AmbiguousBusinessKey`.
    pub async fn resolve<T, F, Fut>(
        &self,
        key: &BusinessKey<'_>,
        lookup: F,
    ) -> Result<Resolution<T>, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, AppError>>,
    {
        let mut matches = lookup().await?;
        match matches.len() {
            0 => Ok(Resolution::Fresh(self.fresh_id(key)?)),
            1 => Ok(Resolution::Existing(matches.remove(0))),
            n => {
                tracing::error!(
                    entity = key.entity,
                    key = %key.describe(),
                    matches = n,
                    "Business key matched more than one record"
                );
                Err(AppError::AmbiguousBusinessKey {
                    entity: key.entity,
                    key: key.describe(),
                    matches: n,
                })
            }
        }
    }
}
