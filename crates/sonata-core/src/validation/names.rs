use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

static ANALYSIS_TYPE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static regex is valid"));

pub fn validate_analysis_type_name(name: &str) -> Result<(), AppError> {
    if ANALYSIS_TYPE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(AppError::InvalidAnalysisTypeName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_type_names() {
        for ok in ["variantCall", "sequencing_read", "qc-metrics.v2", "A1"] {
            assert!(validate_analysis_type_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "variant call", "a/b", "名前", "x;drop"] {
            assert!(validate_analysis_type_name(bad).is_err(), "{bad}");
        }
    }
}
