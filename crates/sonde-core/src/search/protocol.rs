//! Search execution with the status-required fallback
//!
//! A search runs as a small state machine:
//!
//! ```text
//! Initial -> Sent -> Classified -> Done
//!                       |
//!                       +-(400 + OperationOutcome)-> Retrying -> Classified -> Done
//! ```
//!
//! At most one retry is made. It adds the resource type's status parameter
//! with the first value of its vocabulary. A second 400 ends the search as a
//! bad response code.

use serde_json::Value;
use tracing::{debug, info};

use super::params::{self, SearchParameterSpec, SearchParams};
use crate::catalog::{SearchDefinition, StatusFallback};
use crate::client::{FhirResponse, InteractionClient};
use crate::fhir;
use crate::sequence::{RunContext, TestStepResult};
use crate::validation::{ProfileValidator, base_profile};

/// Warning recorded when a retried search is not in the server's capability data
///
/// The recorded text appends the searched parameter names, e.g.
/// `... not documented (patient, clinical-status)`, so match it as a prefix.
pub const UNDOCUMENTED_SEARCH_WARNING: &str = "search interaction for this resource is not documented";

/// How one response was classified
enum Classified {
    /// Usable searchset
    Bundle(Value),
    /// 400; the server may want a status parameter
    StatusRequired(Option<Value>),
    BadStatus(u16),
    NotBundle(String),
}

fn classify(response: FhirResponse) -> Classified {
    match response.status {
        400 => Classified::StatusRequired(response.body),
        status if !(200..400).contains(&status) => Classified::BadStatus(status),
        _ => match response.body {
            Some(body) if fhir::is_bundle(&body) => Classified::Bundle(body),
            Some(body) => Classified::NotBundle(
                fhir::resource_type(&body).unwrap_or("unknown").to_string(),
            ),
            None => Classified::NotBundle("unknown".to_string()),
        },
    }
}

/// Runs searches for one sequence
pub struct SearchProtocol<'a> {
    client: &'a InteractionClient,
    validator: &'a dyn ProfileValidator,
}

impl<'a> SearchProtocol<'a> {
    pub fn new(client: &'a InteractionClient, validator: &'a dyn ProfileValidator) -> Self {
        Self { client, validator }
    }

    /// Run `search` for the context's resource type
    ///
    /// Example-derived parameters come from the context's primary example and
    /// patient parameters from its patient id. On `Pass` the returned
    /// resources are recorded in the context.
    pub async fn execute(
        &self,
        ctx: &mut RunContext,
        search: &SearchDefinition,
        fallback: Option<&StatusFallback>,
    ) -> TestStepResult {
        let resource_type = ctx.resource_type.clone();

        let mut params = match params::build(
            search.params,
            ctx.primary_example.as_ref(),
            ctx.patient_id.as_deref(),
        ) {
            Ok(params) => params,
            Err(unresolved) => return TestStepResult::skip(unresolved.to_string()),
        };
        let mut checks: Vec<SearchParameterSpec> = search.params.to_vec();
        let mut retried = false;

        loop {
            let response = match self.client.search(&resource_type, &params).await {
                Ok(response) => response,
                Err(err) => return TestStepResult::error(err.to_string()),
            };
            debug!(resource_type = %resource_type, status = response.status, retried, "Search response");

            match classify(response) {
                Classified::Bundle(bundle) => {
                    return self.accept(ctx, &bundle, &params, &checks).await;
                }
                Classified::BadStatus(status) => return TestStepResult::bad_response_code(status),
                Classified::NotBundle(found) => {
                    return TestStepResult::fail(format!("Expected FHIR Bundle but found: {found}"));
                }
                Classified::StatusRequired(body) => {
                    let Some((fallback, value)) = fallback
                        .filter(|fallback| !retried && !params.contains_key(fallback.param))
                        .and_then(|fallback| fallback.first_value().map(|value| (fallback, value)))
                    else {
                        return TestStepResult::bad_response_code(400);
                    };

                    if !body.as_ref().is_some_and(fhir::is_operation_outcome) {
                        return TestStepResult::fail(
                            "Server returned a status of 400 without an OperationOutcome.",
                        );
                    }

                    params.insert(fallback.param.to_string(), value.to_string());
                    checks.push(fallback.spec(value));
                    warn_if_undocumented(ctx, &params);
                    info!(
                        resource_type = %resource_type,
                        param = fallback.param,
                        value,
                        "Retrying search with status parameter"
                    );
                    retried = true;
                }
            }
        }
    }

    async fn accept(
        &self,
        ctx: &mut RunContext,
        bundle: &Value,
        params: &SearchParams,
        checks: &[SearchParameterSpec],
    ) -> TestStepResult {
        let resource_type = ctx.resource_type.as_str();
        let entries: Vec<&Value> = fhir::bundle_entries(bundle)
            .into_iter()
            .filter(|entry| fhir::resource_type(entry) == Some(resource_type))
            .collect();

        if entries.is_empty() {
            return TestStepResult::no_resources(resource_type);
        }

        let profile = base_profile(resource_type);
        for entry in &entries {
            match self.validator.validate(entry, &profile).await {
                Ok(violations) => {
                    if let Some(violation) = violations.first() {
                        return TestStepResult::fail(format!("Invalid {resource_type}: {violation}"));
                    }
                }
                Err(err) => return TestStepResult::error(err.to_string()),
            }
        }

        for entry in &entries {
            for spec in checks {
                let Some(expected) = params.get(spec.name) else {
                    continue;
                };
                if !params::matches(spec, entry, expected) {
                    return TestStepResult::fail(format!(
                        "{0} on resource does not match {0} requested",
                        spec.name
                    ));
                }
            }
        }

        let count = entries.len();
        let message = format!("Found {count} {resource_type} resource(s)");
        ctx.record_found(entries);
        TestStepResult::pass(message)
    }
}

fn warn_if_undocumented(ctx: &mut RunContext, params: &SearchParams) {
    let names: Vec<&str> = params.keys().map(String::as_str).collect();
    let documented = ctx
        .capability_statement
        .as_ref()
        .is_some_and(|capabilities| capabilities.documented_search(&ctx.resource_type, &names));

    if !documented {
        let message = format!("{UNDOCUMENTED_SEARCH_WARNING} ({})", names.join(", "));
        ctx.warn(message);
    }
}
