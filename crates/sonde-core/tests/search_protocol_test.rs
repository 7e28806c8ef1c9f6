//! Search execution against a mock FHIR server

mod common;

use common::*;
use serde_json::json;
use sonde_core::sequence::StepStatus;
use sonde_core::validation::BasicValidator;
use sonde_core::search::UNDOCUMENTED_SEARCH_WARNING;
use sonde_core::{
    CapabilitySource, CapabilityStatement, RunContext, SearchProtocol, TestStepResult, catalog,
};
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn run_primary(server_uri: &str, ctx: &mut RunContext) -> TestStepResult {
    let spec = catalog::lookup(&ctx.resource_type).unwrap();
    let client = client(server_uri);
    SearchProtocol::new(&client, &BasicValidator)
        .execute(ctx, spec.primary_search().unwrap(), spec.status_fallback.as_ref())
        .await
}

fn condition_capabilities(combinations: &[&[&str]]) -> Option<Arc<dyn CapabilitySource>> {
    let document = capability_statement(vec![resource_entry(
        "Condition",
        &["search-type", "read"],
        &["patient", "clinical-status"],
        combinations,
    )]);
    Some(Arc::new(CapabilityStatement::from_json(&document).unwrap()))
}

async fn mount_status_required(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/Condition"))
        .and(query_param("patient", "123"))
        .and(query_param_is_missing("clinical-status"))
        .and(header("Authorization", "Bearer ABC"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(operation_outcome("clinical-status required")),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn status_required_search_is_retried_once_and_warns() {
    let server = MockServer::start().await;
    mount_status_required(&server).await;
    Mock::given(method("GET"))
        .and(path("/Condition"))
        .and(query_param("patient", "123"))
        .and(query_param("clinical-status", "active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(vec![condition("c1", "123")])))
        .expect(1)
        .mount(&server)
        .await;

    let mut ctx = RunContext::new("Condition")
        .with_patient("123")
        .with_capabilities(condition_capabilities(&[]));
    let result = run_primary(&server.uri(), &mut ctx).await;

    assert_eq!(result.status, StepStatus::Pass, "{}", result.message);
    assert_eq!(ctx.warnings.len(), 1);
    assert!(ctx.warnings[0].contains("search interaction for this resource is not documented"));
    assert!(ctx.resources_found);
    assert_eq!(ctx.found_resource_ids(), vec!["c1"]);
}

#[tokio::test]
async fn documented_combination_does_not_warn() {
    let server = MockServer::start().await;
    mount_status_required(&server).await;
    Mock::given(method("GET"))
        .and(path("/Condition"))
        .and(query_param("clinical-status", "active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(vec![condition("c1", "123")])))
        .mount(&server)
        .await;

    let mut ctx = RunContext::new("Condition")
        .with_patient("123")
        .with_capabilities(condition_capabilities(&[&["patient", "clinical-status"]]));
    let result = run_primary(&server.uri(), &mut ctx).await;

    assert_eq!(result.status, StepStatus::Pass);
    assert!(ctx.warnings.is_empty());
}

#[tokio::test]
async fn second_400_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Condition"))
        .respond_with(ResponseTemplate::new(400).set_body_json(operation_outcome("still no")))
        .expect(2)
        .mount(&server)
        .await;

    let mut ctx = RunContext::new("Condition").with_patient("123");
    let result = run_primary(&server.uri(), &mut ctx).await;

    assert_eq!(
        result,
        TestStepResult::fail("Bad response code: expected 200, 201, but found 400.")
    );
    assert!(!ctx.resources_found);
}

#[tokio::test]
async fn status_400_without_operation_outcome_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Condition"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let mut ctx = RunContext::new("Condition").with_patient("123");
    let result = run_primary(&server.uri(), &mut ctx).await;

    assert_eq!(
        result,
        TestStepResult::fail("Server returned a status of 400 without an OperationOutcome.")
    );
}

#[tokio::test]
async fn non_bundle_response_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Goal"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"resourceType": "Patient", "id": "123"})),
        )
        .mount(&server)
        .await;

    let mut ctx = RunContext::new("Goal").with_patient("123");
    let result = run_primary(&server.uri(), &mut ctx).await;

    assert_eq!(result, TestStepResult::fail("Expected FHIR Bundle but found: Patient"));
}

#[tokio::test]
async fn empty_bundle_skips() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Goal"))
        .and(query_param("patient", "123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(vec![])))
        .mount(&server)
        .await;

    let mut ctx = RunContext::new("Goal").with_patient("123");
    let result = run_primary(&server.uri(), &mut ctx).await;

    assert_eq!(
        result,
        TestStepResult::skip(
            "No Goal resources appear to be available. Please use patients with more information."
        )
    );
    assert!(ctx.primary_example.is_none());
}

#[tokio::test]
async fn unauthorized_status_is_a_bad_response_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Goal"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut ctx = RunContext::new("Goal").with_patient("123");
    let result = run_primary(&server.uri(), &mut ctx).await;

    assert_eq!(
        result,
        TestStepResult::fail("Bad response code: expected 200, 201, but found 401.")
    );
}

#[tokio::test]
async fn entries_of_other_types_are_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Goal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(vec![
            json!({"resourceType": "OperationOutcome", "issue": []}),
        ])))
        .mount(&server)
        .await;

    let mut ctx = RunContext::new("Goal").with_patient("123");
    let result = run_primary(&server.uri(), &mut ctx).await;
    assert_eq!(result.status, StepStatus::Skip);
}

#[tokio::test]
async fn transport_failure_is_an_error() {
    // nothing listens on the discard port
    let mut ctx = RunContext::new("Goal").with_patient("123");
    let result = run_primary("http://127.0.0.1:9", &mut ctx).await;

    assert_eq!(result.status, StepStatus::Error);
    assert!(!ctx.resources_found);
}

#[tokio::test]
async fn nonconforming_entry_fails_validation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Condition"))
        .and(query_param("patient", "123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(vec![
            json!({"resourceType": "Condition", "id": "!@#$%"}),
        ])))
        .mount(&server)
        .await;

    let mut ctx = RunContext::new("Condition").with_patient("123");
    let result = run_primary(&server.uri(), &mut ctx).await;

    assert_eq!(result.status, StepStatus::Fail);
    assert!(result.message.starts_with("Invalid Condition:"), "{}", result.message);
    assert!(!ctx.resources_found);
    assert!(ctx.primary_example.is_none());
}

#[tokio::test]
async fn retried_search_returning_a_resource_fails() {
    let server = MockServer::start().await;
    mount_status_required(&server).await;
    Mock::given(method("GET"))
        .and(path("/Condition"))
        .and(query_param("clinical-status", "active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(condition("c1", "123")))
        .expect(1)
        .mount(&server)
        .await;

    let mut ctx = RunContext::new("Condition")
        .with_patient("123")
        .with_capabilities(condition_capabilities(&[]));
    let result = run_primary(&server.uri(), &mut ctx).await;

    assert_eq!(result, TestStepResult::fail("Expected FHIR Bundle but found: Condition"));
    assert!(!ctx.resources_found);
}

#[tokio::test]
async fn retried_search_with_server_error_fails() {
    let server = MockServer::start().await;
    mount_status_required(&server).await;
    Mock::given(method("GET"))
        .and(path("/Condition"))
        .and(query_param("clinical-status", "active"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut ctx = RunContext::new("Condition")
        .with_patient("123")
        .with_capabilities(condition_capabilities(&[]));
    let result = run_primary(&server.uri(), &mut ctx).await;

    assert_eq!(
        result,
        TestStepResult::fail("Bad response code: expected 200, 201, but found 500.")
    );
}

#[tokio::test]
async fn goal_search_falls_back_to_lifecycle_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Goal"))
        .and(query_param("patient", "123"))
        .and(query_param_is_missing("lifecycle-status"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(operation_outcome("lifecycle-status required")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut proposed = goal("g1", "123");
    proposed["lifecycleStatus"] = json!("proposed");
    Mock::given(method("GET"))
        .and(path("/Goal"))
        .and(query_param("patient", "123"))
        .and(query_param("lifecycle-status", "proposed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(vec![proposed])))
        .expect(1)
        .mount(&server)
        .await;

    let mut ctx = RunContext::new("Goal").with_patient("123");
    let result = run_primary(&server.uri(), &mut ctx).await;

    assert_eq!(result.status, StepStatus::Pass, "{}", result.message);
    assert_eq!(ctx.warnings.len(), 1);
    assert!(ctx.warnings[0].starts_with(UNDOCUMENTED_SEARCH_WARNING));
    assert_eq!(ctx.found_resource_ids(), vec!["g1"]);
}
