//! Reference collection and resolution
//!
//! Every `{ "reference": "Type/id" }` found anywhere in a resource is read back
//! from the server once. Resolution is shallow: targets are not themselves
//! walked for further references.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::client::InteractionClient;
use crate::fhir::{self, CapabilitySource, Interaction, ReferenceTarget};
use crate::sequence::{StepStatus, TestStepResult};

/// A reference found in a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoundReference {
    /// Element path, e.g. `subject` or `note[0].authorReference`
    pub path: String,
    pub target: ReferenceTarget,
}

/// Result of resolving one reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceOutcome {
    pub path: String,
    pub target: ReferenceTarget,
    pub result: TestStepResult,
}

/// Collect resolvable references in document order
///
/// Contained (`#id`) references and URNs are ignored.
pub fn collect(resource: &Value) -> Vec<FoundReference> {
    let mut found = Vec::new();
    walk(resource, String::new(), &mut found);
    found
}

fn walk(value: &Value, path: String, found: &mut Vec<FoundReference>) {
    match value {
        Value::Object(fields) => {
            if let Some(target) = fields
                .get("reference")
                .and_then(Value::as_str)
                .and_then(ReferenceTarget::parse)
            {
                found.push(FoundReference {
                    path: path.clone(),
                    target,
                });
            }

            for (key, child) in fields {
                if key == "reference" || key == "contained" {
                    continue;
                }
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                walk(child, child_path, found);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                walk(item, format!("{path}[{index}]"), found);
            }
        }
        _ => {}
    }
}

/// Read every reference of `resource` back from the server
pub async fn resolve_all(
    client: &InteractionClient,
    capabilities: &dyn CapabilitySource,
    resource: &Value,
) -> Vec<ReferenceOutcome> {
    let mut outcomes = Vec::new();

    for FoundReference { path, target } in collect(resource) {
        let result = resolve_one(client, capabilities, &target).await;
        debug!(%target, path = %path, status = %result.status, "Reference resolved");
        outcomes.push(ReferenceOutcome {
            path,
            target,
            result,
        });
    }

    outcomes
}

async fn resolve_one(
    client: &InteractionClient,
    capabilities: &dyn CapabilitySource,
    target: &ReferenceTarget,
) -> TestStepResult {
    if !capabilities.supports(&target.resource_type, Interaction::Read) {
        return TestStepResult::skip(format!(
            "This server does not support {} read operation(s) according to conformance statement.",
            target.resource_type
        ));
    }

    let response = match client.read(&target.resource_type, &target.id).await {
        Ok(response) => response,
        Err(err) => return TestStepResult::error(err.to_string()),
    };

    if response.status != 200 {
        return TestStepResult::fail(format!(
            "Could not resolve reference to {target}: status {}",
            response.status
        ));
    }

    let body = response.body.as_ref();
    let returned_type = body.and_then(fhir::resource_type);
    let returned_id = body.and_then(fhir::resource_id);
    if returned_type != Some(target.resource_type.as_str()) || returned_id != Some(target.id.as_str()) {
        return TestStepResult::fail(format!(
            "Reference to {target} returned {}/{}",
            returned_type.unwrap_or("unknown"),
            returned_id.unwrap_or("unknown")
        ));
    }

    TestStepResult::pass("")
}

/// Combine per-reference outcomes into one step result
///
/// Any `Fail` fails the step, then any `Error`, then any `Pass`; a step with
/// nothing resolved (or only skips) is skipped.
pub fn aggregate(outcomes: &[ReferenceOutcome]) -> TestStepResult {
    let messages = |status: StepStatus| -> Vec<String> {
        outcomes
            .iter()
            .filter(|outcome| outcome.result.status == status)
            .map(|outcome| format!("{} ({})", outcome.result.message, outcome.path))
            .collect()
    };

    let failures = messages(StepStatus::Fail);
    if !failures.is_empty() {
        return TestStepResult::fail(failures.join("; "));
    }

    let errors = messages(StepStatus::Error);
    if !errors.is_empty() {
        return TestStepResult::error(errors.join("; "));
    }

    let resolved = outcomes
        .iter()
        .filter(|outcome| outcome.result.status == StepStatus::Pass)
        .count();
    if resolved > 0 {
        return TestStepResult::pass(format!("Resolved {resolved} reference(s)"));
    }

    if outcomes.is_empty() {
        TestStepResult::skip("No references found")
    } else {
        TestStepResult::skip(messages(StepStatus::Skip).join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(path: &str, result: TestStepResult) -> ReferenceOutcome {
        ReferenceOutcome {
            path: path.to_string(),
            target: ReferenceTarget::new("Patient", "123"),
            result,
        }
    }

    #[test]
    fn test_collect_walks_nested_elements() {
        let resource = json!({
            "resourceType": "DocumentReference",
            "id": "d1",
            "subject": {"reference": "Patient/123"},
            "author": [
                {"reference": "http://srv/fhir/Practitioner/p1/_history/2"},
                {"reference": "#inline"}
            ],
            "context": {"encounter": [{"reference": "Encounter/e1"}]},
            "contained": [{"resourceType": "Organization", "id": "inline", "partOf": {"reference": "Organization/o9"}}],
            "relatesTo": [{"target": {"reference": "urn:uuid:1234"}}]
        });

        let found = collect(&resource);
        let pairs: Vec<(String, String)> = found
            .iter()
            .map(|reference| (reference.path.clone(), reference.target.to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("subject".to_string(), "Patient/123".to_string()),
                ("author[0]".to_string(), "Practitioner/p1".to_string()),
                ("context.encounter[0]".to_string(), "Encounter/e1".to_string()),
            ]
        );
    }

    #[test]
    fn test_aggregate_precedence() {
        let pass = outcome("subject", TestStepResult::pass(""));
        let skip = outcome("author[0]", TestStepResult::skip("unsupported"));
        let fail = outcome("encounter", TestStepResult::fail("status 404"));
        let error = outcome("performer[0]", TestStepResult::error("timeout"));

        assert_eq!(aggregate(&[pass.clone(), error.clone(), fail]).status, StepStatus::Fail);
        assert_eq!(aggregate(&[pass.clone(), error]).status, StepStatus::Error);
        assert_eq!(aggregate(&[pass, skip.clone()]).status, StepStatus::Pass);
        assert_eq!(aggregate(&[skip]).status, StepStatus::Skip);
        assert_eq!(aggregate(&[]), TestStepResult::skip("No references found"));
    }
}
