//! Shared fixtures for integration tests

#![allow(dead_code)]

use serde_json::{Value, json};
use sonde_core::fhir::capability::SEARCH_COMBINATION_EXTENSION;
use sonde_core::{HttpTransport, InteractionClient};
use std::sync::Arc;
use std::time::Duration;

pub const TOKEN: &str = "ABC";

/// Client against `base_url` with the test bearer token
pub fn client(base_url: &str) -> InteractionClient {
    let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
    InteractionClient::new(base_url, Arc::new(transport)).with_bearer_token(Some(TOKEN.into()))
}

/// One `rest.resource` entry of a CapabilityStatement
pub fn resource_entry(
    resource_type: &str,
    interactions: &[&str],
    search_params: &[&str],
    combinations: &[&[&str]],
) -> Value {
    let extensions: Vec<Value> = combinations
        .iter()
        .map(|combination| {
            let required: Vec<Value> = combination
                .iter()
                .map(|name| json!({"url": "required", "valueString": name}))
                .collect();
            json!({"url": SEARCH_COMBINATION_EXTENSION, "extension": required})
        })
        .collect();

    json!({
        "type": resource_type,
        "extension": extensions,
        "interaction": interactions.iter().map(|code| json!({"code": code})).collect::<Vec<_>>(),
        "searchParam": search_params
            .iter()
            .map(|name| json!({"name": name, "type": "token"}))
            .collect::<Vec<_>>(),
    })
}

pub fn capability_statement(resources: Vec<Value>) -> Value {
    json!({
        "resourceType": "CapabilityStatement",
        "status": "active",
        "kind": "instance",
        "fhirVersion": "4.0.1",
        "format": ["json"],
        "rest": [{"mode": "server", "resource": resources}]
    })
}

pub fn searchset(resources: Vec<Value>) -> Value {
    sonde_core::fhir::searchset(resources)
}

pub fn operation_outcome(diagnostics: &str) -> Value {
    json!({
        "resourceType": "OperationOutcome",
        "issue": [{"severity": "error", "code": "required", "diagnostics": diagnostics}]
    })
}

pub fn condition(id: &str, patient: &str) -> Value {
    json!({
        "resourceType": "Condition",
        "id": id,
        "meta": {"versionId": "1"},
        "clinicalStatus": {"coding": [{"system": "http://terminology.hl7.org/CodeSystem/condition-clinical", "code": "active"}]},
        "verificationStatus": {"coding": [{"code": "confirmed"}]},
        "category": [{"coding": [{"code": "problem-list-item"}]}],
        "code": {"coding": [{"system": "http://snomed.info/sct", "code": "38341003"}]},
        "subject": {"reference": format!("Patient/{patient}")},
        "onsetDateTime": "2019-06-01T10:15:00Z"
    })
}

pub fn goal(id: &str, patient: &str) -> Value {
    json!({
        "resourceType": "Goal",
        "id": id,
        "meta": {"versionId": "1"},
        "lifecycleStatus": "active",
        "description": {"text": "Walk 30 minutes a day"},
        "subject": {"reference": format!("Patient/{patient}")},
        "target": [{"dueDate": "2021-06-01"}]
    })
}
