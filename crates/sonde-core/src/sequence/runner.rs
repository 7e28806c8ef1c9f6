//! Sequence runner
//!
//! Executes a resource type's ordered step list against one server. Steps run
//! strictly in order over an explicit [`RunContext`]; every result is kept and
//! execution continues whatever earlier steps reported. The only early stop is
//! an abort requested through an [`AbortHandle`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span};

use super::context::RunContext;
use super::step::{StepKind, StepStatus, TestStep, TestStepResult};
use crate::catalog::ResourceSpec;
use crate::client::{FhirResponse, InteractionClient};
use crate::fhir;
use crate::search::{self, SearchProtocol};
use crate::validation::ProfileValidator;
use crate::{must_support, references};

/// Cooperative cancellation, checked between steps
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the run before its next step
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }
}

/// Aggregate outcome of a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceOutcome {
    Pass,
    Fail,
    Skip,
}

impl SequenceOutcome {
    /// `Fail` if any step failed or errored, `Pass` if any passed or warned,
    /// otherwise `Skip` (including when no step ran)
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a TestStepResult>) -> Self {
        let mut outcome = SequenceOutcome::Skip;
        for result in results {
            match result.status {
                StepStatus::Fail | StepStatus::Error => return SequenceOutcome::Fail,
                StepStatus::Pass | StepStatus::Warning => outcome = SequenceOutcome::Pass,
                StepStatus::Skip => {}
            }
        }
        outcome
    }
}

/// One executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub result: TestStepResult,
    pub duration_ms: u64,
}

/// Everything a run produced, for reporting and persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceResult {
    pub resource_type: String,
    pub profile: String,
    pub outcome: SequenceOutcome,
    pub steps: Vec<StepReport>,
    pub warnings: Vec<String>,
    pub found_resource_ids: Vec<String>,
    pub aborted: bool,
}

impl SequenceResult {
    /// Number of steps that ended with `status`
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps
            .iter()
            .filter(|step| step.result.status == status)
            .count()
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == SequenceOutcome::Fail
    }
}

/// Runs sequences against one server
pub struct SequenceRunner {
    client: InteractionClient,
    validator: Arc<dyn ProfileValidator>,
    abort: AbortHandle,
}

impl SequenceRunner {
    pub fn new(client: InteractionClient, validator: Arc<dyn ProfileValidator>) -> Self {
        Self {
            client,
            validator,
            abort: AbortHandle::new(),
        }
    }

    /// Handle that aborts every run of this runner
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Run the standard step list of `spec`
    pub async fn run(&self, spec: &ResourceSpec, ctx: &mut RunContext) -> SequenceResult {
        self.run_steps(spec, &spec.steps(), ctx).await
    }

    /// Run an explicit step list
    pub async fn run_steps(
        &self,
        spec: &ResourceSpec,
        steps: &[TestStep],
        ctx: &mut RunContext,
    ) -> SequenceResult {
        let client = self.client.clone().with_bearer_token(ctx.bearer_token.clone());
        let mut reports = Vec::with_capacity(steps.len());
        let mut aborted = false;

        info!(resource_type = %spec.resource_type, steps = steps.len(), "Starting sequence");

        for step in steps {
            if self.abort.is_aborted() {
                info!(resource_type = %spec.resource_type, "Sequence aborted");
                aborted = true;
                break;
            }

            let started = Instant::now();
            let span = info_span!("step", id = %step.id);
            let result = self
                .run_step(&client, spec, step, ctx)
                .instrument(span)
                .await;

            info!(step = %step.id, status = %result.status, "{}", step.name);
            if !result.message.is_empty() {
                debug!(step = %step.id, message = %result.message);
            }

            reports.push(StepReport {
                id: step.id.clone(),
                name: step.name.clone(),
                result,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        let outcome = SequenceOutcome::from_results(reports.iter().map(|report| &report.result));
        info!(resource_type = %spec.resource_type, outcome = ?outcome, "Sequence finished");

        SequenceResult {
            resource_type: spec.resource_type.to_string(),
            profile: spec.profile.to_string(),
            outcome,
            steps: reports,
            warnings: ctx.warnings.clone(),
            found_resource_ids: ctx.found_resource_ids(),
            aborted,
        }
    }

    async fn run_step(
        &self,
        client: &InteractionClient,
        spec: &ResourceSpec,
        step: &TestStep,
        ctx: &mut RunContext,
    ) -> TestStepResult {
        if let Some(skip) = unsupported(step, ctx) {
            return skip;
        }
        if step.gated && !ctx.resources_found {
            return TestStepResult::no_resources(&ctx.resource_type);
        }

        let result = match step.kind {
            StepKind::UnauthorizedSearch => unauthorized_search(client, spec, ctx).await,
            StepKind::Search(search) => {
                SearchProtocol::new(client, self.validator.as_ref())
                    .execute(ctx, &search, spec.status_fallback.as_ref())
                    .await
            }
            StepKind::Read => read(client, ctx).await,
            StepKind::Vread => vread(client, ctx).await,
            StepKind::History => history(client, ctx).await,
            StepKind::ProfileConformance => self.profile_conformance(spec, ctx).await,
            StepKind::MustSupport => {
                must_support::check(&ctx.resource_type, ctx.found_resources(), spec.must_support)
            }
            StepKind::ReferenceResolution => reference_resolution(client, ctx).await,
        };

        if step.optional && result.is_fail() {
            TestStepResult::warning(result.message)
        } else {
            result
        }
    }

    async fn profile_conformance(&self, spec: &ResourceSpec, ctx: &RunContext) -> TestStepResult {
        for resource in ctx.found_resources() {
            match self.validator.validate(resource, spec.profile).await {
                Ok(violations) => {
                    if let Some(violation) = violations.first() {
                        return TestStepResult::fail(format!(
                            "Invalid {}/{}: {violation}",
                            ctx.resource_type,
                            fhir::resource_id(resource).unwrap_or("unknown")
                        ));
                    }
                }
                Err(err) => return TestStepResult::error(err.to_string()),
            }
        }

        TestStepResult::pass(format!(
            "{} resource(s) conform to {}",
            ctx.found_resources().len(),
            spec.title
        ))
    }
}

/// Skip for steps whose interactions the server does not declare
fn unsupported(step: &TestStep, ctx: &RunContext) -> Option<TestStepResult> {
    if step.requires.is_empty() {
        return None;
    }

    let Some(capabilities) = ctx.capability_statement.as_ref() else {
        return Some(TestStepResult::skip(format!(
            "Server capability statement is unavailable; cannot determine {} support.",
            ctx.resource_type
        )));
    };

    step.requires
        .iter()
        .find(|interaction| !capabilities.supports(&ctx.resource_type, **interaction))
        .map(|interaction| {
            TestStepResult::skip(format!(
                "This server does not support {} {interaction} operation(s) according to conformance statement.",
                ctx.resource_type
            ))
        })
}

async fn unauthorized_search(
    client: &InteractionClient,
    spec: &ResourceSpec,
    ctx: &RunContext,
) -> TestStepResult {
    if ctx.bearer_token.is_none() {
        return TestStepResult::skip("Could not verify this functionality when bearer token is not set");
    }

    let Some(primary) = spec.primary_search() else {
        return TestStepResult::skip(format!("No search is defined for {}", ctx.resource_type));
    };

    let params = match search::build(primary.params, None, ctx.patient_id.as_deref()) {
        Ok(params) => params,
        Err(unresolved) => return TestStepResult::skip(unresolved.to_string()),
    };

    match client.without_auth().search(&ctx.resource_type, &params).await {
        Ok(response) if response.status == 401 => TestStepResult::pass(""),
        Ok(response) => TestStepResult::fail(format!(
            "Bad response code: expected 401, but found {}.",
            response.status
        )),
        Err(err) => TestStepResult::error(err.to_string()),
    }
}

/// Primary example's id, or the step result to report when there is none
fn example_id(ctx: &RunContext) -> Result<&str, TestStepResult> {
    ctx.primary_example
        .as_ref()
        .and_then(fhir::resource_id)
        .ok_or_else(|| TestStepResult::no_resources(&ctx.resource_type))
}

/// Checks shared by read and vread: status 200, matching type and id
fn check_instance(ctx: &RunContext, id: &str, response: &FhirResponse) -> TestStepResult {
    if response.status != 200 {
        return TestStepResult::bad_response_code(response.status);
    }

    let body = response.body.as_ref();
    let returned_type = body.and_then(fhir::resource_type).unwrap_or("unknown");
    if returned_type != ctx.resource_type {
        return TestStepResult::fail(format!(
            "Expected {} resource but found: {returned_type}",
            ctx.resource_type
        ));
    }

    let returned_id = body.and_then(fhir::resource_id).unwrap_or("unknown");
    if returned_id != id {
        return TestStepResult::fail(format!(
            "Expected resource with id {id} but found {returned_id}"
        ));
    }

    TestStepResult::pass("")
}

async fn read(client: &InteractionClient, ctx: &RunContext) -> TestStepResult {
    let id = match example_id(ctx) {
        Ok(id) => id,
        Err(result) => return result,
    };

    match client.read(&ctx.resource_type, id).await {
        Ok(response) => check_instance(ctx, id, &response),
        Err(err) => TestStepResult::error(err.to_string()),
    }
}

async fn vread(client: &InteractionClient, ctx: &RunContext) -> TestStepResult {
    let id = match example_id(ctx) {
        Ok(id) => id,
        Err(result) => return result,
    };

    let Some(version_id) = ctx.primary_example.as_ref().and_then(fhir::version_id) else {
        return TestStepResult::fail(format!(
            "{}/{id} has no meta.versionId to read",
            ctx.resource_type
        ));
    };

    match client.vread(&ctx.resource_type, id, version_id).await {
        Ok(response) => check_instance(ctx, id, &response),
        Err(err) => TestStepResult::error(err.to_string()),
    }
}

async fn history(client: &InteractionClient, ctx: &RunContext) -> TestStepResult {
    let id = match example_id(ctx) {
        Ok(id) => id,
        Err(result) => return result,
    };

    let response = match client.history(&ctx.resource_type, id).await {
        Ok(response) => response,
        Err(err) => return TestStepResult::error(err.to_string()),
    };

    if response.status != 200 {
        return TestStepResult::bad_response_code(response.status);
    }

    let Some(bundle) = response.body.as_ref().filter(|body| fhir::is_bundle(body)) else {
        return TestStepResult::fail(format!(
            "Expected FHIR Bundle but found: {}",
            response.resource_type().unwrap_or("unknown")
        ));
    };

    let entries = bundle
        .get("entry")
        .and_then(|entry| entry.as_array())
        .map_or(0, Vec::len);
    if entries == 0 {
        return TestStepResult::fail(format!(
            "History of {}/{id} has no entries",
            ctx.resource_type
        ));
    }

    TestStepResult::pass(format!("{entries} version(s) in history"))
}

async fn reference_resolution(client: &InteractionClient, ctx: &RunContext) -> TestStepResult {
    let (Some(example), Some(capabilities)) =
        (ctx.primary_example.as_ref(), ctx.capability_statement.as_ref())
    else {
        return TestStepResult::no_resources(&ctx.resource_type);
    };

    let outcomes = references::resolve_all(client, capabilities.as_ref(), example).await;
    references::aggregate(&outcomes)
}
