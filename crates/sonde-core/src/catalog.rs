//! Resource catalog
//!
//! Per-resource-type behavior is plain data: which searches to run, which
//! status vocabulary a server may demand, which instance interactions to
//! exercise and which elements are must-support. One generic engine consumes
//! these entries.

use serde::Serialize;

use crate::error::SondeError;
use crate::fhir::Interaction;
use crate::result::Result;
use crate::search::{SearchParameterSpec, ValueTransform};
use crate::sequence::{StepKind, TestStep};

/// Status parameter a server may require on searches, with its vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusFallback {
    pub param: &'static str,
    pub path: &'static str,
    pub values: &'static [&'static str],
}

impl StatusFallback {
    pub fn first_value(&self) -> Option<&'static str> {
        self.values.first().copied()
    }

    /// Parameter spec used to check returned resources against `value`
    pub fn spec(&self, value: &'static str) -> SearchParameterSpec {
        SearchParameterSpec::fixed(self.param, self.path, value, ValueTransform::CodeOnly)
    }
}

/// One declared search: its parameters, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchDefinition {
    pub params: &'static [SearchParameterSpec],
    pub optional: bool,
}

impl SearchDefinition {
    pub const fn required(params: &'static [SearchParameterSpec]) -> Self {
        Self {
            params,
            optional: false,
        }
    }

    pub const fn optional(params: &'static [SearchParameterSpec]) -> Self {
        Self {
            params,
            optional: true,
        }
    }

    pub fn param_names(&self) -> Vec<&'static str> {
        self.params.iter().map(|spec| spec.name).collect()
    }

    /// `patient+category` style label
    pub fn label(&self) -> String {
        self.param_names().join("+")
    }
}

/// Catalog entry for one resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    pub resource_type: &'static str,
    pub title: &'static str,
    pub profile: &'static str,
    /// First entry is the primary search
    pub searches: &'static [SearchDefinition],
    pub status_fallback: Option<StatusFallback>,
    /// Instance interactions exercised on the primary example
    pub interactions: &'static [Interaction],
    pub must_support: &'static [&'static str],
}

impl ResourceSpec {
    pub fn primary_search(&self) -> Option<&SearchDefinition> {
        self.searches.first()
    }

    /// The standard ordered step list for this resource type
    pub fn steps(&self) -> Vec<TestStep> {
        let t = self.resource_type;
        let mut steps = Vec::new();

        steps.push(
            TestStep::new(
                "unauthorized-search",
                format!("Server rejects {t} search without authorization"),
                StepKind::UnauthorizedSearch,
            )
            .requires(&[Interaction::Search]),
        );

        for (index, search) in self.searches.iter().enumerate() {
            let step = TestStep::new(
                format!("search-{}", search.label()),
                format!("Server returns expected results from {t} search by {}", search.label()),
                StepKind::Search(*search),
            )
            .requires(&[Interaction::Search])
            .optional(search.optional);

            steps.push(if index == 0 { step } else { step.gated() });
        }

        for interaction in self.interactions {
            let kind = match interaction {
                Interaction::Read => StepKind::Read,
                Interaction::Vread => StepKind::Vread,
                Interaction::History => StepKind::History,
                Interaction::Search => continue,
            };
            steps.push(
                TestStep::new(
                    interaction.to_string(),
                    format!("{t} {interaction} resource supported"),
                    kind,
                )
                .requires(&[*interaction])
                .gated(),
            );
        }

        steps.push(
            TestStep::new(
                "profile",
                format!("{t} resources associated with Patient conform to {}", self.title),
                StepKind::ProfileConformance,
            )
            .gated(),
        );

        steps.push(
            TestStep::new(
                "must-support",
                format!("At least one of every must support element is provided in any {t} for this patient."),
                StepKind::MustSupport,
            )
            .gated(),
        );

        steps.push(
            TestStep::new(
                "references",
                "All references can be resolved",
                StepKind::ReferenceResolution,
            )
            .requires(&[Interaction::Search, Interaction::Read])
            .gated(),
        );

        steps
    }
}

const INSTANCE_INTERACTIONS: &[Interaction] =
    &[Interaction::Read, Interaction::Vread, Interaction::History];

const PATIENT: SearchParameterSpec = SearchParameterSpec::patient("patient", "subject");

mod condition {
    use super::*;

    const CATEGORY: SearchParameterSpec =
        SearchParameterSpec::example("category", "category", ValueTransform::CodeOnly);
    const ONSET_DATE: SearchParameterSpec =
        SearchParameterSpec::example("onset-date", "onset", ValueTransform::DateOnly);
    const CLINICAL_STATUS: SearchParameterSpec =
        SearchParameterSpec::example("clinical-status", "clinicalStatus", ValueTransform::CodeOnly);
    const CODE: SearchParameterSpec =
        SearchParameterSpec::example("code", "code", ValueTransform::CodeOnly);

    pub(super) const SPEC: ResourceSpec = ResourceSpec {
        resource_type: "Condition",
        title: "US Core Condition Profile",
        profile: "http://hl7.org/fhir/us/core/StructureDefinition/us-core-condition",
        searches: &[
            SearchDefinition::required(&[PATIENT]),
            SearchDefinition::optional(&[PATIENT, CATEGORY]),
            SearchDefinition::optional(&[PATIENT, ONSET_DATE]),
            SearchDefinition::optional(&[PATIENT, CLINICAL_STATUS]),
            SearchDefinition::optional(&[PATIENT, CODE]),
        ],
        status_fallback: Some(StatusFallback {
            param: "clinical-status",
            path: "clinicalStatus",
            values: &["active", "recurrence", "relapse", "inactive", "remission", "resolved"],
        }),
        interactions: INSTANCE_INTERACTIONS,
        must_support: &[
            "Condition.clinicalStatus",
            "Condition.verificationStatus",
            "Condition.category",
            "Condition.code",
            "Condition.subject",
        ],
    };
}

mod goal {
    use super::*;

    const TARGET_DATE: SearchParameterSpec =
        SearchParameterSpec::example("target-date", "target.due", ValueTransform::DateOnly);
    const LIFECYCLE_STATUS: SearchParameterSpec =
        SearchParameterSpec::example("lifecycle-status", "lifecycleStatus", ValueTransform::None);

    pub(super) const SPEC: ResourceSpec = ResourceSpec {
        resource_type: "Goal",
        title: "US Core Goal Profile",
        profile: "http://hl7.org/fhir/us/core/StructureDefinition/us-core-goal",
        searches: &[
            SearchDefinition::required(&[PATIENT]),
            SearchDefinition::optional(&[PATIENT, TARGET_DATE]),
            SearchDefinition::optional(&[PATIENT, LIFECYCLE_STATUS]),
        ],
        status_fallback: Some(StatusFallback {
            param: "lifecycle-status",
            path: "lifecycleStatus",
            values: &[
                "proposed",
                "planned",
                "accepted",
                "active",
                "on-hold",
                "completed",
                "cancelled",
                "entered-in-error",
                "rejected",
            ],
        }),
        interactions: INSTANCE_INTERACTIONS,
        must_support: &[
            "Goal.lifecycleStatus",
            "Goal.description",
            "Goal.subject",
            "Goal.target",
            "Goal.target.dueDate",
        ],
    };
}

mod pulse_oximetry {
    use super::*;

    const CODE: SearchParameterSpec =
        SearchParameterSpec::fixed("code", "code", "59408-5", ValueTransform::CodeOnly);
    const CATEGORY: SearchParameterSpec =
        SearchParameterSpec::example("category", "category", ValueTransform::CodeOnly);
    const DATE: SearchParameterSpec =
        SearchParameterSpec::example("date", "effective", ValueTransform::DateOnly);
    const STATUS: SearchParameterSpec =
        SearchParameterSpec::example("status", "status", ValueTransform::None);

    pub(super) const SPEC: ResourceSpec = ResourceSpec {
        resource_type: "Observation",
        title: "US Core Pulse Oximetry Profile",
        profile: "http://hl7.org/fhir/us/core/StructureDefinition/us-core-pulse-oximetry",
        searches: &[
            SearchDefinition::required(&[PATIENT, CODE]),
            SearchDefinition::required(&[PATIENT, CATEGORY, DATE]),
            SearchDefinition::required(&[PATIENT, CATEGORY]),
            SearchDefinition::optional(&[PATIENT, CATEGORY, STATUS]),
            SearchDefinition::optional(&[PATIENT, CODE, DATE]),
        ],
        status_fallback: Some(StatusFallback {
            param: "status",
            path: "status",
            values: &[
                "registered",
                "preliminary",
                "final",
                "amended",
                "corrected",
                "cancelled",
                "entered-in-error",
                "unknown",
            ],
        }),
        interactions: INSTANCE_INTERACTIONS,
        must_support: &[
            "Observation.status",
            "Observation.category",
            "Observation.category.coding",
            "Observation.category.coding.system",
            "Observation.category.coding.code",
            "Observation.code",
            "Observation.code.coding",
            "Observation.code.coding.system",
            "Observation.code.coding.code",
            "Observation.subject",
            "Observation.effective",
            "Observation.valueQuantity",
            "Observation.valueQuantity.value",
            "Observation.valueQuantity.unit",
            "Observation.valueQuantity.system",
            "Observation.valueQuantity.code",
            "Observation.dataAbsentReason",
            "Observation.component",
            "Observation.component.code",
            "Observation.component.value",
            "Observation.component.dataAbsentReason",
        ],
    };
}

mod document_reference {
    use super::*;

    const ID: SearchParameterSpec = SearchParameterSpec::example("_id", "id", ValueTransform::None);
    const CATEGORY: SearchParameterSpec =
        SearchParameterSpec::example("category", "category", ValueTransform::CodeOnly);
    const DATE: SearchParameterSpec =
        SearchParameterSpec::example("date", "date", ValueTransform::DateOnly);
    const TYPE: SearchParameterSpec =
        SearchParameterSpec::example("type", "type", ValueTransform::CodeOnly);
    const STATUS: SearchParameterSpec =
        SearchParameterSpec::example("status", "status", ValueTransform::None);
    const PERIOD: SearchParameterSpec =
        SearchParameterSpec::example("period", "context.period", ValueTransform::DateOnly);

    pub(super) const SPEC: ResourceSpec = ResourceSpec {
        resource_type: "DocumentReference",
        title: "US Core DocumentReference Profile",
        profile: "http://hl7.org/fhir/us/core/StructureDefinition/us-core-documentreference",
        searches: &[
            SearchDefinition::required(&[PATIENT]),
            SearchDefinition::required(&[ID]),
            SearchDefinition::required(&[PATIENT, CATEGORY]),
            SearchDefinition::required(&[PATIENT, CATEGORY, DATE]),
            SearchDefinition::required(&[PATIENT, TYPE]),
            SearchDefinition::optional(&[PATIENT, STATUS]),
            SearchDefinition::optional(&[PATIENT, TYPE, PERIOD]),
        ],
        status_fallback: Some(StatusFallback {
            param: "status",
            path: "status",
            values: &["current", "superseded", "entered-in-error"],
        }),
        interactions: INSTANCE_INTERACTIONS,
        must_support: &[
            "DocumentReference.identifier",
            "DocumentReference.status",
            "DocumentReference.type",
            "DocumentReference.category",
            "DocumentReference.subject",
            "DocumentReference.date",
            "DocumentReference.author",
            "DocumentReference.custodian",
            "DocumentReference.content",
            "DocumentReference.content.attachment",
            "DocumentReference.content.attachment.contentType",
            "DocumentReference.content.attachment.data",
            "DocumentReference.content.attachment.url",
            "DocumentReference.content.format",
            "DocumentReference.context",
            "DocumentReference.context.encounter",
            "DocumentReference.context.period",
        ],
    };
}

/// All shipped catalog entries
pub static CATALOG: &[ResourceSpec] = &[
    condition::SPEC,
    goal::SPEC,
    pulse_oximetry::SPEC,
    document_reference::SPEC,
];

/// Look up the entry for a resource type
pub fn lookup(resource_type: &str) -> Result<&'static ResourceSpec> {
    CATALOG
        .iter()
        .find(|spec| spec.resource_type == resource_type)
        .ok_or_else(|| SondeError::unknown_resource_type(resource_type))
}

/// Resource types with a catalog entry
pub fn resource_types() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|spec| spec.resource_type)
}
