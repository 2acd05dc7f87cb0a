//! Shape validation for file update requests.
//!
//! Runs before any stored state is consulted and reports every violated
//! field at once.

use std::borrow::Cow;

use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::AppError;
use crate::models::{AccessType, FileUpdate, FileUpdateRequest};

const MD5_HEX_LEN: usize = 32;

pub(crate) fn validate_md5sum(value: &str) -> Result<(), ValidationError> {
    let valid = value.len() == MD5_HEX_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("md5sum")
            .with_message(Cow::from("must be 32 lowercase hexadecimal characters")))
    }
}

pub(crate) fn validate_access(value: &str) -> Result<(), ValidationError> {
    if value.parse::<AccessType>().is_ok() {
        return Ok(());
    }
    let allowed: Vec<&str> = AccessType::ALL.iter().map(AccessType::as_str).collect();
    Err(ValidationError::new("access")
        .with_message(Cow::from(format!("must be one of [{}]", allowed.join(", ")))))
}

fn wire_name(field: &str) -> &str {
    match field {
        "file_size" => "fileSize",
        "file_md5sum" => "fileMd5sum",
        "file_access" => "fileAccess",
        other => other,
    }
}

/// Flatten validator output into sorted `field: message` lines.
fn violations(errors: &ValidationErrors) -> Vec<String> {
    let mut lines = Vec::new();
    for (field, field_errors) in errors.field_errors() {
        let field: &str = field.as_ref();
        for error in field_errors.iter() {
            let message = error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| error.code.to_string());
            lines.push(format!("{}: {}", wire_name(field), message));
        }
    }
    lines.sort();
    lines
}

/// Check the request shape and convert it into a typed [`FileUpdate`].
pub fn validate_file_update(
    object_id: &str,
    request: &FileUpdateRequest,
) -> Result<FileUpdate, AppError> {
    if let Err(errors) = request.validate() {
        return Err(AppError::InvalidFileUpdateRequest {
            object_id: object_id.to_string(),
            violations: violations(&errors),
        });
    }

    let file_access = match request.file_access.as_deref() {
        Some(access) => Some(access.parse::<AccessType>().map_err(|e| {
            AppError::InvalidFileUpdateRequest {
                object_id: object_id.to_string(),
                violations: vec![format!("fileAccess: {}", e)],
            }
        })?),
        None => None,
    };

    Ok(FileUpdate {
        file_size: request.file_size,
        file_md5sum: request.file_md5sum.clone(),
        file_access,
        info: request.info.clone(),
    })
}
