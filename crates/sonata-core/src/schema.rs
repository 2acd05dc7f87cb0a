//! Schema rendering for analysis types.
//!
//! Registered schemas only describe what is specific to their type. The
//! rendered form combines them with the base analysis schema that every
//! payload must satisfy.

use serde_json::{json, Value};

use crate::error::AppError;

/// Fields every analysis payload carries regardless of its type.
pub fn base_analysis_schema() -> Value {
    json!({
        "type": "object",
        "required": ["studyId", "analysisType", "samples", "files"],
        "properties": {
            "analysisId": { "type": "string" },
            "studyId": { "type": "string", "minLength": 1 },
            "analysisType": {
                "oneOf": [
                    { "type": "string", "minLength": 1 },
                    {
                        "type": "object",
                        "required": ["name"],
                        "properties": {
                            "name": { "type": "string", "minLength": 1 },
                            "version": { "type": ["integer", "null"], "minimum": 1 }
                        }
                    }
                ]
            },
            "samples": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["submitterSampleId", "sampleType", "specimen", "donor"],
                    "properties": {
                        "submitterSampleId": { "type": "string", "minLength": 1 },
                        "sampleType": { "type": "string" },
                        "specimen": {
                            "type": "object",
                            "required": ["submitterSpecimenId", "specimenType"],
                            "properties": {
                                "submitterSpecimenId": { "type": "string", "minLength": 1 },
                                "specimenType": { "type": "string" }
                            }
                        },
                        "donor": {
                            "type": "object",
                            "required": ["submitterDonorId", "gender"],
                            "properties": {
                                "submitterDonorId": { "type": "string", "minLength": 1 },
                                "gender": { "type": "string" }
                            }
                        }
                    }
                }
            },
            "files": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["fileName", "fileSize", "fileMd5sum", "fileType", "fileAccess"],
                    "properties": {
                        "fileName": { "type": "string", "minLength": 1 },
                        "fileSize": { "type": "integer", "minimum": 1 },
                        "fileMd5sum": { "type": "string", "pattern": "^[a-f0-9]{32}$" },
                        "fileType": { "type": "string" },
                        "fileAccess": { "enum": ["open", "controlled"] }
                    }
                }
            }
        }
    })
}

/// The schema a payload is validated against: the base schema and the stored one.
pub fn render(stored: Option<&Value>) -> Value {
    match stored {
        Some(schema) => json!({ "allOf": [base_analysis_schema(), schema] }),
        None => base_analysis_schema(),
    }
}

/// Registered schemas must be JSON objects.
pub fn ensure_schema_object(schema: &Value) -> Result<(), AppError> {
    if schema.is_object() {
        Ok(())
    } else {
        Err(AppError::MalformedSchema(
            "the schema must be a JSON object".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_wraps_stored_schema() {
        let stored = json!({"type": "object", "required": ["experiment"]});
        let rendered = render(Some(&stored));
        let parts = rendered["allOf"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], base_analysis_schema());
        assert_eq!(parts[1], stored);
    }

    #[test]
    fn test_render_without_stored_schema_is_base() {
        assert_eq!(render(None), base_analysis_schema());
    }

    #[test]
    fn test_schema_must_be_object() {
        assert!(ensure_schema_object(&json!({})).is_ok());
        assert!(ensure_schema_object(&json!([1])).is_err());
        assert!(ensure_schema_object(&json!("x")).is_err());
    }
}
