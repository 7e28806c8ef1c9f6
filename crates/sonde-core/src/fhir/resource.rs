//! Structural helpers over schema-less FHIR JSON documents

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A FHIR resource is handled as an opaque JSON document.
pub type Resource = Value;

/// `resourceType` of a document, if present
pub fn resource_type(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

/// Logical `id` of a document, if present
pub fn resource_id(resource: &Value) -> Option<&str> {
    resource.get("id").and_then(Value::as_str)
}

/// `meta.versionId` of a document, if present
pub fn version_id(resource: &Value) -> Option<&str> {
    resource
        .get("meta")
        .and_then(|meta| meta.get("versionId"))
        .and_then(Value::as_str)
}

/// Whether the document is a Bundle
pub fn is_bundle(resource: &Value) -> bool {
    resource_type(resource) == Some("Bundle")
}

/// Whether the document is an OperationOutcome
pub fn is_operation_outcome(resource: &Value) -> bool {
    resource_type(resource) == Some("OperationOutcome")
}

/// Resources carried in a Bundle's `entry[].resource`, in order.
///
/// Entries without a resource are dropped; a non-Bundle yields nothing.
pub fn bundle_entries(bundle: &Value) -> Vec<&Value> {
    if !is_bundle(bundle) {
        return Vec::new();
    }

    bundle
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("resource"))
                .collect()
        })
        .unwrap_or_default()
}

/// Wrap resources in a `searchset` Bundle
pub fn searchset(resources: impl IntoIterator<Item = Value>) -> Value {
    let entries: Vec<Value> = resources
        .into_iter()
        .map(|resource| serde_json::json!({ "resource": resource }))
        .collect();

    serde_json::json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "total": entries.len(),
        "entry": entries,
    })
}

/// Target of a literal reference: `Type/id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceTarget {
    pub resource_type: String,
    pub id: String,
}

impl ReferenceTarget {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Parse a literal reference string.
    ///
    /// Accepts `Type/id`, `Type/id/_history/vid` and absolute URLs ending in
    /// either form. Contained references (`#id`), URNs and anything whose type
    /// segment does not look like a resource type yield `None`.
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        if reference.is_empty() || reference.starts_with('#') || reference.starts_with("urn:") {
            return None;
        }

        let mut segments: Vec<&str> = reference
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        if segments.len() >= 4 && segments[segments.len() - 2] == "_history" {
            segments.truncate(segments.len() - 2);
        }

        if segments.len() < 2 {
            return None;
        }

        let id = segments[segments.len() - 1];
        let resource_type = segments[segments.len() - 2];

        if !is_resource_type_name(resource_type) {
            return None;
        }

        Some(Self::new(resource_type, id))
    }
}

impl fmt::Display for ReferenceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

fn is_resource_type_name(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundle_entries() {
        let bundle = searchset(vec![
            json!({"resourceType": "Condition", "id": "a"}),
            json!({"resourceType": "Condition", "id": "b"}),
        ]);

        let entries = bundle_entries(&bundle);
        assert_eq!(entries.len(), 2);
        assert_eq!(resource_id(entries[1]), Some("b"));
    }

    #[test]
    fn test_bundle_entries_of_non_bundle() {
        let condition = json!({"resourceType": "Condition", "entry": [{"resource": {}}]});
        assert!(bundle_entries(&condition).is_empty());
    }

    #[test]
    fn test_parse_relative_reference() {
        let target = ReferenceTarget::parse("Patient/123").unwrap();
        assert_eq!(target, ReferenceTarget::new("Patient", "123"));
        assert_eq!(target.to_string(), "Patient/123");
    }

    #[test]
    fn test_parse_absolute_and_versioned_reference() {
        assert_eq!(
            ReferenceTarget::parse("http://example.org/fhir/Encounter/e1/_history/3"),
            Some(ReferenceTarget::new("Encounter", "e1"))
        );
    }

    #[test]
    fn test_parse_rejects_contained_and_urn() {
        assert_eq!(ReferenceTarget::parse("#med1"), None);
        assert_eq!(
            ReferenceTarget::parse("urn:uuid:8d7c5a2e-0000-0000-0000-000000000000"),
            None
        );
        assert_eq!(ReferenceTarget::parse("123"), None);
        assert_eq!(ReferenceTarget::parse("patient/123"), None);
    }
}
