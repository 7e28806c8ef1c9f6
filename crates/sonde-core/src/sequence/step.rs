//! Step outcomes and step declarations

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::SearchDefinition;
use crate::fhir::Interaction;

/// Outcome classification of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pass,
    Fail,
    Skip,
    Warning,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pass => "pass",
            StepStatus::Fail => "fail",
            StepStatus::Skip => "skip",
            StepStatus::Warning => "warning",
            StepStatus::Error => "error",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStepResult {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl TestStepResult {
    pub fn new(status: StepStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Pass, message)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Fail, message)
    }

    pub fn skip(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Skip, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Error, message)
    }

    /// Fail for an unexpected HTTP status
    pub fn bad_response_code(status: u16) -> Self {
        Self::fail(format!(
            "Bad response code: expected 200, 201, but found {status}."
        ))
    }

    /// Skip for a search that returned nothing usable
    pub fn no_resources(resource_type: &str) -> Self {
        Self::skip(format!(
            "No {resource_type} resources appear to be available. Please use patients with more information."
        ))
    }

    pub fn is_fail(&self) -> bool {
        self.status == StepStatus::Fail
    }
}

/// What a step does when it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Primary search without credentials; the server must answer 401
    UnauthorizedSearch,
    /// One declared search
    Search(SearchDefinition),
    /// Read the primary example
    Read,
    /// Version-specific read of the primary example
    Vread,
    /// History of the primary example
    History,
    /// Validate every found resource against the resource profile
    ProfileConformance,
    /// Check must-support coverage of the found resources
    MustSupport,
    /// Resolve every reference in the primary example
    ReferenceResolution,
}

/// A named, ordered step of a sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestStep {
    pub id: String,
    pub name: String,
    pub kind: StepKind,
    /// Interactions the server must declare for the step to run
    pub requires: Vec<Interaction>,
    /// Only runs once a search has found resources
    pub gated: bool,
    /// Failures are reported as warnings
    pub optional: bool,
}

impl TestStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            requires: Vec::new(),
            gated: false,
            optional: false,
        }
    }

    pub fn requires(mut self, interactions: &[Interaction]) -> Self {
        self.requires.extend_from_slice(interactions);
        self
    }

    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }
}
