//! Error types module
//!
//! This module provides the core error types used throughout sonata.
//! All errors are unified under the `AppError` enum. Every variant belongs to one
//! [`ErrorKind`] family so callers can branch on the family (retry, escalate, report)
//! without matching individual variants.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for business rule rejections
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Error family an [`AppError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code a transport layer should use
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "ILLEGAL_FILE_UPDATE_REQUEST")
    fn error_code(&self) -> &'static str;

    /// Error family
    fn error_kind(&self) -> ErrorKind;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("The studyId '{0}' does not exist")]
    StudyIdDoesNotExist(String),

    #[error("The studyId '{0}' already exists")]
    StudyAlreadyExists(String),

    #[error("The uploadId '{0}' was not found")]
    UploadIdNotFound(String),

    #[error("The analysisId '{0}' was not found")]
    AnalysisIdNotFound(String),

    #[error("Analysis type not found: {0}")]
    AnalysisTypeNotFound(String),

    #[error("The file with objectId '{0}' was not found")]
    FileNotFound(String),

    #[error("Multiple {entity} records found for business key {key}")]
    AmbiguousBusinessKey {
        entity: &'static str,
        key: String,
        matches: usize,
    },

    #[error("Unable to parse the input payload: {0}")]
    PayloadParsing(String),

    #[error("Invalid file update request for objectId '{object_id}': {}", violations.join("; "))]
    InvalidFileUpdateRequest {
        object_id: String,
        violations: Vec<String>,
    },

    #[error("UploadId {upload_id} is in state '{state}', but must be in state 'VALIDATED' before it can be saved")]
    UploadIdNotValidated { upload_id: String, state: String },

    #[error("Cannot change the content of file '{object_id}' because analysis '{analysis_id}' is {state}; content may only change while UNPUBLISHED")]
    IllegalFileUpdateRequest {
        object_id: String,
        analysis_id: String,
        state: String,
    },

    #[error("The file with objectId '{object_id}' is not related to studyId '{study_id}'")]
    FileUnrelatedToStudy { object_id: String, study_id: String },

    #[error("An upload for analysisId '{analysis_id}' in study '{study_id}' was created concurrently")]
    UploadConflict {
        study_id: String,
        analysis_id: String,
    },

    #[error("The analysisId '{0}' already exists")]
    DuplicateAnalysisAttempt(String),

    #[error("A {entity} with id '{id}' already exists")]
    DuplicateRecord { entity: &'static str, id: String },

    #[error("The analysisId '{analysis_id}' is {state} and cannot be replaced")]
    IllegalAnalysisResave { analysis_id: String, state: String },

    #[error("Invalid analysis type name '{0}'")]
    InvalidAnalysisTypeName(String),

    #[error("Malformed schema: {0}")]
    MalformedSchema(String),

    #[error("Could not create analysisId for upload id '{0}'")]
    AnalysisIdNotCreated(String),

    #[error("Expected {expected} row(s) affected when writing {entity} '{id}', got {actual}")]
    UnexpectedRowCount {
        entity: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    /// Fail with [`AppError::UnexpectedRowCount`] unless exactly one row was written.
    pub fn expect_single_row(entity: &'static str, id: &str, actual: u64) -> Result<(), AppError> {
        if actual == 1 {
            Ok(())
        } else {
            Err(AppError::UnexpectedRowCount {
                entity,
                id: id.to_string(),
                expected: 1,
                actual,
            })
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::PayloadParsing(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, kind, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    ErrorKind,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            ErrorKind::Internal,
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::StudyIdDoesNotExist(_) => (
            404,
            "STUDY_ID_DOES_NOT_EXIST",
            ErrorKind::NotFound,
            false,
            Some("Verify the study ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::StudyAlreadyExists(_) => (
            409,
            "STUDY_ALREADY_EXISTS",
            ErrorKind::Conflict,
            false,
            Some("Use a different study ID"),
            false,
            LogLevel::Debug,
        ),
        AppError::UploadIdNotFound(_) => (
            404,
            "UPLOAD_ID_NOT_FOUND",
            ErrorKind::NotFound,
            false,
            Some("Verify the upload ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::AnalysisIdNotFound(_) => (
            404,
            "ANALYSIS_ID_NOT_FOUND",
            ErrorKind::NotFound,
            false,
            Some("Verify the analysis ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::AnalysisTypeNotFound(_) => (
            404,
            "ANALYSIS_TYPE_NOT_FOUND",
            ErrorKind::NotFound,
            false,
            Some("Register the analysis type or check its name and version"),
            false,
            LogLevel::Debug,
        ),
        AppError::FileNotFound(_) => (
            404,
            "FILE_NOT_FOUND",
            ErrorKind::NotFound,
            false,
            Some("Verify the object ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::AmbiguousBusinessKey { .. } => (
            404,
            "AMBIGUOUS_BUSINESS_KEY",
            ErrorKind::NotFound,
            false,
            Some("Contact support; duplicate records violate a uniqueness invariant"),
            true,
            LogLevel::Error,
        ),
        AppError::PayloadParsing(_) => (
            400,
            "PAYLOAD_PARSING",
            ErrorKind::Validation,
            false,
            Some("Submit a well-formed JSON document"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidFileUpdateRequest { .. } => (
            400,
            "INVALID_FILE_UPDATE_REQUEST",
            ErrorKind::Validation,
            false,
            Some("Fix every listed field and resubmit"),
            false,
            LogLevel::Debug,
        ),
        AppError::UploadIdNotValidated { .. } => (
            400,
            "UPLOAD_ID_NOT_VALIDATED",
            ErrorKind::Validation,
            false,
            Some("Wait for validation to pass before saving"),
            false,
            LogLevel::Debug,
        ),
        AppError::IllegalFileUpdateRequest { .. } => (
            409,
            "ILLEGAL_FILE_UPDATE_REQUEST",
            ErrorKind::Conflict,
            false,
            Some("Only metadata fields may change once an analysis is published"),
            false,
            LogLevel::Warn,
        ),
        AppError::FileUnrelatedToStudy { .. } => (
            409,
            "FILE_UNRELATED_TO_STUDY",
            ErrorKind::Conflict,
            false,
            Some("Use the study that owns the file"),
            false,
            LogLevel::Warn,
        ),
        AppError::UploadConflict { .. } => (
            409,
            "UPLOAD_CONFLICT",
            ErrorKind::Conflict,
            true,
            Some("Retry the upload"),
            false,
            LogLevel::Warn,
        ),
        AppError::DuplicateAnalysisAttempt(_) => (
            409,
            "DUPLICATE_ANALYSIS_ATTEMPT",
            ErrorKind::Conflict,
            false,
            Some("Use a new analysisId or save with ignoreCollisions"),
            false,
            LogLevel::Debug,
        ),
        AppError::DuplicateRecord { .. } => (
            409,
            "DUPLICATE_RECORD",
            ErrorKind::Conflict,
            true,
            Some("Retry the save; identical records are resolved on the next attempt"),
            false,
            LogLevel::Warn,
        ),
        AppError::IllegalAnalysisResave { .. } => (
            409,
            "ILLEGAL_ANALYSIS_RESAVE",
            ErrorKind::Conflict,
            false,
            Some("Unpublish the analysis before replacing it"),
            false,
            LogLevel::Warn,
        ),
        AppError::InvalidAnalysisTypeName(_) => (
            400,
            "INVALID_ANALYSIS_TYPE_NAME",
            ErrorKind::Validation,
            false,
            Some("Use only letters, digits, '.', '_' and '-'"),
            false,
            LogLevel::Debug,
        ),
        AppError::MalformedSchema(_) => (
            400,
            "MALFORMED_SCHEMA",
            ErrorKind::Validation,
            false,
            Some("Submit a valid JSON schema object"),
            false,
            LogLevel::Debug,
        ),
        AppError::AnalysisIdNotCreated(_) => (
            500,
            "ANALYSIS_ID_NOT_CREATED",
            ErrorKind::Internal,
            true,
            Some("Retry the save"),
            true,
            LogLevel::Error,
        ),
        AppError::UnexpectedRowCount { .. } => (
            500,
            "UNEXPECTED_ROW_COUNT",
            ErrorKind::Internal,
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            ErrorKind::Validation,
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            ErrorKind::Internal,
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            ErrorKind::Internal,
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::StudyIdDoesNotExist(_) => "StudyIdDoesNotExist",
            AppError::StudyAlreadyExists(_) => "StudyAlreadyExists",
            AppError::UploadIdNotFound(_) => "UploadIdNotFound",
            AppError::AnalysisIdNotFound(_) => "AnalysisIdNotFound",
            AppError::AnalysisTypeNotFound(_) => "AnalysisTypeNotFound",
            AppError::FileNotFound(_) => "FileNotFound",
            AppError::AmbiguousBusinessKey { .. } => "AmbiguousBusinessKey",
            AppError::PayloadParsing(_) => "PayloadParsing",
            AppError::InvalidFileUpdateRequest { .. } => "InvalidFileUpdateRequest",
            AppError::UploadIdNotValidated { .. } => "UploadIdNotValidated",
            AppError::IllegalFileUpdateRequest { .. } => "IllegalFileUpdateRequest",
            AppError::FileUnrelatedToStudy { .. } => "FileUnrelatedToStudy",
            AppError::UploadConflict { .. } => "UploadConflict",
            AppError::DuplicateAnalysisAttempt(_) => "DuplicateAnalysisAttempt",
            AppError::DuplicateRecord { .. } => "DuplicateRecord",
            AppError::IllegalAnalysisResave { .. } => "IllegalAnalysisResave",
            AppError::InvalidAnalysisTypeName(_) => "InvalidAnalysisTypeName",
            AppError::MalformedSchema(_) => "MalformedSchema",
            AppError::AnalysisIdNotCreated(_) => "AnalysisIdNotCreated",
            AppError::UnexpectedRowCount { .. } => "UnexpectedRowCount",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn error_kind(&self) -> ErrorKind {
        app_error_static_metadata(self).2
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).3
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).4
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).5
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).6
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::AmbiguousBusinessKey { entity, .. } => {
                format!("Inconsistent {} records", entity)
            }
            AppError::AnalysisIdNotCreated(_) | AppError::UnexpectedRowCount { .. } => {
                "Failed to persist the requested change".to_string()
            }
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}
