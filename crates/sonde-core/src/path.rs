//! Element path resolution over FHIR JSON documents
//!
//! Resolves dotted element paths such as `subject.reference` or
//! `category.coding.code` against a resource (or a collection of resources).
//!
//! # Rules
//!
//! - Every segment descends into the named field.
//! - Arrays fan out: the remainder of the path is tried against each element
//!   and the first element for which it resolves wins. This is first-match,
//!   never an aggregate over all elements.
//! - Choice-type elements (`onset[x]`, `effective[x]`, ...) are addressed by
//!   their bare name. When the bare field is absent, the typed variants
//!   (`onsetDateTime`, `onsetPeriod`, ...) are tried in [`CHOICE_TYPE_SUFFIXES`]
//!   order.
//! - Missing fields, `null` and empty arrays resolve to `None`. Absence is a
//!   normal outcome, never an error.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use sonde_core::path;
//!
//! let condition = json!({
//!     "resourceType": "Condition",
//!     "code": { "coding": [{ "system": "http://snomed.info/sct", "code": "38341003" }] },
//!     "onsetDateTime": "2019-06-01T10:00:00Z"
//! });
//!
//! assert_eq!(path::resolve(&condition, "code.coding.code"), Some(&json!("38341003")));
//! assert_eq!(path::resolve(&condition, "onset"), Some(&json!("2019-06-01T10:00:00Z")));
//! assert!(!path::can_resolve(&condition, "abatement", None));
//! ```

use serde_json::Value;

/// Type suffixes of FHIR R4 choice elements, in lookup order
pub const CHOICE_TYPE_SUFFIXES: &[&str] = &[
    "DateTime",
    "Period",
    "Age",
    "Range",
    "String",
    "Boolean",
    "Integer",
    "Decimal",
    "Date",
    "Time",
    "Instant",
    "Quantity",
    "CodeableConcept",
    "Coding",
    "Reference",
    "Ratio",
    "SampledData",
    "Duration",
    "Timing",
    "Identifier",
    "Attachment",
    "Annotation",
    "Uri",
    "Url",
    "Canonical",
    "Code",
    "Id",
    "Oid",
    "Uuid",
    "Markdown",
    "UnsignedInt",
    "PositiveInt",
    "Base64Binary",
    "Address",
    "ContactPoint",
    "Count",
    "Distance",
    "HumanName",
    "Money",
    "Signature",
    "Dosage",
    "Meta",
];

/// A predicate over resolved leaf values
pub type ValuePredicate<'p> = &'p dyn Fn(&Value) -> bool;

/// Resolve `path` against a resource or a collection of resources
pub fn resolve<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    resolve_with(value, path, &|_| true)
}

/// Resolve `path`, accepting only leaf values that satisfy `predicate`
///
/// Fan-out continues past leaves that fail the predicate, so this answers
/// "does any value at this path satisfy the predicate" and returns the first
/// one that does.
pub fn resolve_with<'a>(value: &'a Value, path: &str, predicate: ValuePredicate<'_>) -> Option<&'a Value> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    walk(value, &segments, predicate)
}

/// Predicate form: whether `path` resolves (to a value satisfying `predicate`, if given)
pub fn can_resolve(resource: &Value, path: &str, predicate: Option<ValuePredicate<'_>>) -> bool {
    match predicate {
        Some(predicate) => resolve_with(resource, path, predicate).is_some(),
        None => resolve(resource, path).is_some(),
    }
}

fn walk<'a>(value: &'a Value, segments: &[&str], predicate: ValuePredicate<'_>) -> Option<&'a Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => items
            .iter()
            .find_map(|item| walk(item, segments, predicate)),
        _ => {
            let Some((segment, rest)) = segments.split_first() else {
                return predicate(value).then_some(value);
            };

            let Value::Object(fields) = value else {
                return None;
            };

            if let Some(child) = fields.get(*segment) {
                return walk(child, rest, predicate);
            }

            CHOICE_TYPE_SUFFIXES.iter().find_map(|suffix| {
                fields
                    .get(&format!("{segment}{suffix}"))
                    .and_then(|child| walk(child, rest, predicate))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observation() -> Value {
        json!({
            "resourceType": "Observation",
            "id": "pulse-ox",
            "status": "final",
            "category": [
                {"coding": [{"system": "http://terminology.hl7.org/CodeSystem/observation-category"}]},
                {"coding": [{"code": "vital-signs"}]}
            ],
            "code": {"coding": [{"system": "http://loinc.org", "code": "59408-5"}, {"code": "2708-6"}]},
            "subject": {"reference": "Patient/123"},
            "effectivePeriod": {"start": "2020-01-01", "end": "2020-01-02"},
            "component": [
                {"code": {"text": "flow"}, "valueQuantity": {"value": 6, "unit": "l/min"}}
            ],
            "note": []
        })
    }

    #[test]
    fn test_resolve_nested_field() {
        let obs = observation();
        assert_eq!(resolve(&obs, "subject.reference"), Some(&json!("Patient/123")));
        assert_eq!(resolve(&obs, "status"), Some(&json!("final")));
    }

    #[test]
    fn test_array_fan_out_is_first_match() {
        let obs = observation();
        // first category has no code, second one does
        assert_eq!(resolve(&obs, "category.coding.code"), Some(&json!("vital-signs")));
        assert_eq!(resolve(&obs, "code.coding.code"), Some(&json!("59408-5")));
    }

    #[test]
    fn test_choice_type_resolution() {
        let obs = observation();
        assert_eq!(resolve(&obs, "effective.start"), Some(&json!("2020-01-01")));
        assert_eq!(resolve(&obs, "component.value.unit"), Some(&json!("l/min")));
        assert_eq!(resolve(&obs, "effectivePeriod.end"), Some(&json!("2020-01-02")));
    }

    #[test]
    fn test_missing_paths_are_absent() {
        let obs = observation();
        assert_eq!(resolve(&obs, "valueQuantity.value"), None);
        assert_eq!(resolve(&obs, "subject.display"), None);
        assert_eq!(resolve(&obs, "status.coding"), None);
        assert_eq!(resolve(&obs, "note"), None);
        assert_eq!(resolve(&json!([]), "id"), None);
        assert_eq!(resolve(&json!({"id": null}), "id"), None);
    }

    #[test]
    fn test_predicate_continues_fan_out() {
        let obs = observation();
        let wanted = |value: &Value| value == "2708-6";
        assert_eq!(resolve_with(&obs, "code.coding.code", &wanted), Some(&json!("2708-6")));

        let never = |_: &Value| false;
        assert!(!can_resolve(&obs, "code.coding.code", Some(&never)));
        assert!(can_resolve(&obs, "code.coding.code", None));
    }

    #[test]
    fn test_resolve_over_collection() {
        let resources = json!([
            {"resourceType": "Condition", "id": "a"},
            {"resourceType": "Condition", "id": "b", "onsetDateTime": "2018-04-02"}
        ]);
        assert_eq!(resolve(&resources, "onset"), Some(&json!("2018-04-02")));
        assert_eq!(resolve(&resources, "id"), Some(&json!("a")));
    }

    #[test]
    fn test_empty_path_resolves_to_value_itself() {
        let value = json!("final");
        assert_eq!(resolve(&value, ""), Some(&value));
    }
}
