//! JSON-schema validation collaborator.

use serde::Serialize;
use serde_json::Value;
use sonata_core::AppError;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// One failed schema rule, located by JSON pointer into the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl Display for SchemaViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{}: {}", path, self.message)
    }
}

pub trait SchemaValidator: Send + Sync {
    /// Fails with `MalformedSchema` when `schema` cannot be compiled.
    fn check_schema(&self, schema: &Value) -> Result<(), AppError>;

    /// Every violation of `schema` by `payload`; empty means valid.
    fn validate(&self, schema: &Value, payload: &Value) -> Result<Vec<SchemaViolation>, AppError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidator;

impl JsonSchemaValidator {
    fn compile(schema: &Value) -> Result<jsonschema::Validator, AppError> {
        jsonschema::validator_for(schema).map_err(|e| AppError::MalformedSchema(e.to_string()))
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn check_schema(&self, schema: &Value) -> Result<(), AppError> {
        Self::compile(schema).map(|_| ())
    }

    fn validate(&self, schema: &Value, payload: &Value) -> Result<Vec<SchemaViolation>, AppError> {
        let validator = Self::compile(schema)?;
        Ok(validator
            .iter_errors(payload)
            .map(|e| SchemaViolation {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect())
    }
}
