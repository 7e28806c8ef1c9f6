//! Profile validation seam
//!
//! Full structural validation (cardinality, bindings, invariants) is delegated
//! to an external validator. The engine only needs a list of violations back.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::client::{HttpRequest, Transport};
use crate::error::SondeError;
use crate::fhir;
use crate::result::Result;

const BASE_PROFILE_PREFIX: &str = "http://hl7.org/fhir/StructureDefinition/";

static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-\.]{1,64}$").unwrap());

/// Canonical URL of the base profile for a resource type
pub fn base_profile(resource_type: &str) -> String {
    format!("{BASE_PROFILE_PREFIX}{resource_type}")
}

/// Validates resources against a profile
#[async_trait]
pub trait ProfileValidator: Send + Sync {
    /// Violations of `profile` found in `resource`; empty when valid
    async fn validate(&self, resource: &Value, profile: &str) -> Result<Vec<String>>;
}

/// Structural checks that need no profile definitions
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicValidator;

#[async_trait]
impl ProfileValidator for BasicValidator {
    async fn validate(&self, resource: &Value, profile: &str) -> Result<Vec<String>> {
        let mut violations = Vec::new();

        if !resource.is_object() {
            violations.push("resource is not a JSON object".to_string());
            return Ok(violations);
        }

        match fhir::resource_type(resource) {
            None => violations.push("resourceType is missing".to_string()),
            Some(actual) => {
                if let Some(expected) = profile_resource_type(profile)
                    && expected != actual
                {
                    violations.push(format!(
                        "resourceType {actual} does not match profile type {expected}"
                    ));
                }
            }
        }

        match resource.get("id") {
            None => {}
            Some(Value::String(id)) if ID_REGEX.is_match(id) => {}
            Some(id) => violations.push(format!("id {id} is not a valid FHIR id")),
        }

        Ok(violations)
    }
}

/// Resource type a base profile constrains, if the profile is a base profile
fn profile_resource_type(profile: &str) -> Option<&str> {
    profile
        .strip_prefix(BASE_PROFILE_PREFIX)
        .filter(|name| name.starts_with(|c: char| c.is_ascii_uppercase()))
}

/// Delegates to an external validation service
///
/// The resource is POSTed to `<url>/validate?profile=<profile>`; `error` and
/// `fatal` issues of the returned OperationOutcome become violations.
pub struct RemoteValidator {
    url: String,
    transport: Arc<dyn Transport>,
}

impl RemoteValidator {
    pub fn new(url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            transport,
        }
    }
}

#[async_trait]
impl ProfileValidator for RemoteValidator {
    async fn validate(&self, resource: &Value, profile: &str) -> Result<Vec<String>> {
        let request = HttpRequest::post(format!("{}/validate", self.url), resource.to_string())
            .header("Content-Type", "application/fhir+json")
            .header("Accept", "application/fhir+json")
            .query([("profile", profile)]);

        let response = self.transport.send(request).await?;
        if !(200..300).contains(&response.status) {
            return Err(SondeError::validator(format!(
                "validation service returned status {}",
                response.status
            )));
        }

        let outcome: Value = serde_json::from_str(&response.body)?;
        if !fhir::is_operation_outcome(&outcome) {
            return Err(SondeError::validator(
                "validation service did not return an OperationOutcome",
            ));
        }

        let violations = outcome_errors(&outcome);
        debug!(profile, count = violations.len(), "Remote validation finished");
        Ok(violations)
    }
}

fn outcome_errors(outcome: &Value) -> Vec<String> {
    outcome
        .get("issue")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|issue| {
            matches!(
                issue.get("severity").and_then(Value::as_str),
                Some("error" | "fatal")
            )
        })
        .map(|issue| {
            let text = issue
                .get("diagnostics")
                .and_then(Value::as_str)
                .or_else(|| {
                    issue
                        .get("details")
                        .and_then(|details| details.get("text"))
                        .and_then(Value::as_str)
                })
                .unwrap_or("unspecified error");

            match issue
                .get("expression")
                .and_then(Value::as_array)
                .and_then(|expressions| expressions.first())
                .and_then(Value::as_str)
            {
                Some(location) => format!("{location}: {text}"),
                None => text.to_string(),
            }
        })
        .collect()
}
