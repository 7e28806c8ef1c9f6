//! Per-run mutable state

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::fhir::{self, CapabilitySource};

/// State of one sequence run for one resource type
///
/// Owned by exactly one runner; each step receives it explicitly.
pub struct RunContext {
    pub resource_type: String,
    pub patient_id: Option<String>,
    pub bearer_token: Option<String>,
    /// `None` when the server's capability data is absent or malformed
    pub capability_statement: Option<Arc<dyn CapabilitySource>>,
    pub primary_example: Option<Value>,
    pub resources_found: bool,
    pub warnings: Vec<String>,
    found_resources: Vec<Value>,
    seen_ids: HashSet<String>,
}

impl RunContext {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            patient_id: None,
            bearer_token: None,
            capability_statement: None,
            primary_example: None,
            resources_found: false,
            warnings: Vec::new(),
            found_resources: Vec::new(),
            seen_ids: HashSet::new(),
        }
    }

    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|token| !token.is_empty());
        self
    }

    pub fn with_capabilities(mut self, capabilities: Option<Arc<dyn CapabilitySource>>) -> Self {
        self.capability_statement = capabilities;
        self
    }

    /// Record resources returned by a successful search
    ///
    /// The first recorded resource becomes the primary example. Resources
    /// already recorded (same id) are kept only once.
    pub fn record_found<'a>(&mut self, resources: impl IntoIterator<Item = &'a Value>) {
        for resource in resources {
            if let Some(id) = fhir::resource_id(resource)
                && !self.seen_ids.insert(id.to_string())
            {
                continue;
            }

            if self.primary_example.is_none() {
                self.primary_example = Some(resource.clone());
            }
            self.found_resources.push(resource.clone());
            self.resources_found = true;
        }
    }

    pub fn found_resources(&self) -> &[Value] {
        &self.found_resources
    }

    /// Ids of the found resources, in discovery order
    pub fn found_resource_ids(&self) -> Vec<String> {
        self.found_resources
            .iter()
            .filter_map(fhir::resource_id)
            .map(str::to_string)
            .collect()
    }

    /// Record a non-fatal observation about the server
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(resource_type = %self.resource_type, "{}", message);
        self.warnings.push(message);
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("resource_type", &self.resource_type)
            .field("patient_id", &self.patient_id)
            .field("has_capabilities", &self.capability_statement.is_some())
            .field("resources_found", &self.resources_found)
            .field("found", &self.found_resources.len())
            .field("warnings", &self.warnings)
            .finish()
    }
}
