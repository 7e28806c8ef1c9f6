//! FHIR document helpers and server capability data

pub mod capability;
pub mod resource;

pub use capability::{CapabilitySource, CapabilityStatement, Interaction, ResourceCapabilities};
pub use resource::{
    Resource, ReferenceTarget, bundle_entries, is_bundle, is_operation_outcome, resource_id,
    resource_type, searchset, version_id,
};
