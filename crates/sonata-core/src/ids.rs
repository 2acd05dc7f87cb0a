//! External id generation.
//!
//! Random ids are used for records without a business key (uploads, analyses
//! submitted without an `analysisId`). Deterministic ids are derived from a
//! business key so that re-submitting the same donor, specimen, sample or file
//! always yields the same id.

use std::fmt;

use sha2::{Digest, Sha256};
use uuid::Uuid;

const DETERMINISTIC_HEX_LEN: usize = 24;
const PART_SEPARATOR: &[u8] = b"\x1f";

/// Entity-kind prefix carried by every generated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdPrefix {
    Donor,
    Specimen,
    Sample,
    File,
    Analysis,
    Upload,
}

impl IdPrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            IdPrefix::Donor => "DO",
            IdPrefix::Specimen => "SP",
            IdPrefix::Sample => "SA",
            IdPrefix::File => "FI",
            IdPrefix::Analysis => "AN",
            IdPrefix::Upload => "UP",
        }
    }
}

impl fmt::Display for IdPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait IdGenerator: Send + Sync {
    /// A fresh id, unique per call.
    fn generate(&self, prefix: IdPrefix) -> String;

    /// An id that is stable for identical `(prefix, parts)`.
    fn generate_deterministic(&self, prefix: IdPrefix, parts: &[&str]) -> String;
}

/// Default generator: uuid v4 for random ids, namespaced SHA-256 for deterministic ones.
#[derive(Debug, Clone)]
pub struct HashIdGenerator {
    namespace: String,
}

impl HashIdGenerator {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl Default for HashIdGenerator {
    fn default() -> Self {
        Self::new("sonata")
    }
}

impl IdGenerator for HashIdGenerator {
    fn generate(&self, prefix: IdPrefix) -> String {
        format!("{}{}", prefix, Uuid::new_v4().simple())
    }

    fn generate_deterministic(&self, prefix: IdPrefix, parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.namespace.as_bytes());
        hasher.update(PART_SEPARATOR);
        hasher.update(prefix.as_str().as_bytes());
        for part in parts {
            hasher.update(PART_SEPARATOR);
            hasher.update(part.as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        format!("{}{}", prefix, &digest[..DETERMINISTIC_HEX_LEN])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ids_are_prefixed_and_unique() {
        let ids = HashIdGenerator::default();
        let a = ids.generate(IdPrefix::Upload);
        let b = ids.generate(IdPrefix::Upload);
        assert!(a.starts_with("UP"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_deterministic_ids_are_stable() {
        let ids = HashIdGenerator::default();
        let a = ids.generate_deterministic(IdPrefix::Donor, &["ABC123", "donor-1"]);
        let b = ids.generate_deterministic(IdPrefix::Donor, &["ABC123", "donor-1"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2 + DETERMINISTIC_HEX_LEN);
        assert!(a.starts_with("DO"));
    }

    #[test]
    fn test_deterministic_ids_separate_parts_and_kinds() {
        let ids = HashIdGenerator::default();
        let joined = ids.generate_deterministic(IdPrefix::Sample, &["ab", "c"]);
        let shifted = ids.generate_deterministic(IdPrefix::Sample, &["a", "bc"]);
        assert_ne!(joined, shifted);

        let donor = ids.generate_deterministic(IdPrefix::Donor, &["ABC123", "x"]);
        let specimen = ids.generate_deterministic(IdPrefix::Specimen, &["ABC123", "x"]);
        assert_ne!(donor[2..], specimen[2..]);
    }

    #[test]
    fn test_namespace_changes_ids() {
        let a = HashIdGenerator::new("east").generate_deterministic(IdPrefix::File, &["AN1", "f.bam"]);
        let b = HashIdGenerator::new("west").generate_deterministic(IdPrefix::File, &["AN1", "f.bam"]);
        assert_ne!(a, b);
    }
}
