#![allow(dead_code)]

pub mod fixtures;

use serde_json::json;
use sonata_core::models::{CreateStudyRequest, UploadRecord};
use sonata_core::{Config, ValidationMode};
use sonata_services::ServiceContext;
use std::time::Duration;

pub const STUDY_ID: &str = "ABC123";
pub const OTHER_STUDY_ID: &str = "XYZ234";
pub const ANALYSIS_TYPE: &str = "variantCall";

/// In-memory services with synchronous validation, two studies and one
/// registered analysis type.
pub async fn setup_test_context() -> ServiceContext {
    setup_with(Config::for_tests()).await
}

pub async fn setup_with(config: Config) -> ServiceContext {
    let ctx = ServiceContext::in_memory(config);
    for study_id in [STUDY_ID, OTHER_STUDY_ID] {
        let request: CreateStudyRequest =
            serde_json::from_value(json!({"studyId": study_id, "name": "Test study"}))
                .expect("valid study request");
        ctx.studies.create(request).await.expect("study created");
    }
    ctx.analysis_types
        .register(ANALYSIS_TYPE, fixtures::variant_call_schema())
        .await
        .expect("analysis type registered");
    ctx
}

pub fn async_config() -> Config {
    Config {
        validation_mode: ValidationMode::Async,
        ..Config::for_tests()
    }
}

/// Poll an upload until background validation has left the pending states.
pub async fn wait_for_verdict(ctx: &ServiceContext, upload_id: &str) -> UploadRecord {
    for _ in 0..200 {
        let record = ctx.uploads.read(upload_id).await.expect("upload exists");
        if !record.state.is_pending() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("upload {} was never validated", upload_id);
}

/// Ingest and save `payload`, returning the analysis id.
pub async fn submit_analysis(ctx: &ServiceContext, payload: &str) -> String {
    let ingested = ctx
        .uploads
        .ingest(STUDY_ID, payload)
        .await
        .expect("payload ingested");
    assert!(
        ingested.errors.is_empty(),
        "unexpected validation errors: {:?}",
        ingested.errors
    );
    ctx.uploads
        .save(STUDY_ID, &ingested.upload_id, false)
        .await
        .expect("upload saved")
        .analysis_id
}
