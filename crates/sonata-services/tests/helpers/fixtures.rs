use serde_json::{json, Value};

pub const REFERENCE_MD5: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90";
pub const REFERENCE_SIZE: i64 = 777777;

pub fn variant_call_schema() -> Value {
    json!({
        "type": "object",
        "required": ["experiment"],
        "properties": {
            "experiment": {
                "type": "object",
                "required": ["platform"],
                "properties": {"platform": {"type": "string"}}
            }
        }
    })
}

/// A payload that passes the base schema and the `variantCall` schema.
pub fn analysis_payload(analysis_id: Option<&str>) -> Value {
    let mut payload = json!({
        "studyId": "ABC123",
        "analysisType": {"name": "variantCall"},
        "experiment": {"platform": "ILLUMINA"},
        "samples": [{
            "submitterSampleId": "sample-1",
            "sampleType": "Total DNA",
            "specimen": {
                "submitterSpecimenId": "specimen-1",
                "specimenType": "Normal",
                "tissueSource": "Blood"
            },
            "donor": {"submitterDonorId": "donor-1", "gender": "female"}
        }],
        "files": [{
            "fileName": "sample-1.vcf.gz",
            "fileSize": REFERENCE_SIZE,
            "fileMd5sum": REFERENCE_MD5,
            "fileType": "VCF",
            "fileAccess": "controlled",
            "info": {"dataCategory": "Simple Nucleotide Variation"}
        }]
    });
    if let Some(analysis_id) = analysis_id {
        payload["analysisId"] = json!(analysis_id);
    }
    payload
}

pub fn payload_text(analysis_id: Option<&str>) -> String {
    analysis_payload(analysis_id).to_string()
}
