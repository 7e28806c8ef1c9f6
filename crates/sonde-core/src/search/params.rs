//! Search parameter specs and the parameter builder
//!
//! A [`SearchParameterSpec`] says where a query value comes from and how the
//! raw element is shaped into query syntax. [`build`] turns an ordered list of
//! specs into a concrete [`SearchParams`] map, or reports the first parameter
//! it could not resolve. Partial parameter sets are never produced.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::fhir::ReferenceTarget;
use crate::path;

/// Concrete query parameters, in the order they were declared
pub type SearchParams = IndexMap<String, String>;

/// How a resolved element is turned into a query value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueTransform {
    /// Scalars are used as-is
    None,
    /// Timestamps are truncated to `YYYY-MM-DD`
    DateOnly,
    /// The innermost `code` of a CodeableConcept or Coding
    CodeOnly,
    /// Raw ids become `Type/id` for the given type
    ReferenceFormat(&'static str),
}

/// Where a parameter's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueOrigin {
    /// Resolved from the source (example) resource at the spec's path
    Example,
    /// The run's patient id, sent as-is
    Patient,
    /// A fixed value mandated by the profile
    Fixed(&'static str),
}

/// One query parameter of a search step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchParameterSpec {
    pub name: &'static str,
    pub path: &'static str,
    pub transform: ValueTransform,
    pub origin: ValueOrigin,
}

impl SearchParameterSpec {
    /// Value resolved from the example resource
    pub const fn example(name: &'static str, path: &'static str, transform: ValueTransform) -> Self {
        Self {
            name,
            path,
            transform,
            origin: ValueOrigin::Example,
        }
    }

    /// The run's patient id; `path` locates the patient reference in results
    pub const fn patient(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            path,
            transform: ValueTransform::ReferenceFormat("Patient"),
            origin: ValueOrigin::Patient,
        }
    }

    /// A fixed profile-mandated value
    pub const fn fixed(
        name: &'static str,
        path: &'static str,
        value: &'static str,
        transform: ValueTransform,
    ) -> Self {
        Self {
            name,
            path,
            transform,
            origin: ValueOrigin::Fixed(value),
        }
    }
}

/// A parameter whose value could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not resolve {param} in given resource")]
pub struct Unresolved {
    pub param: String,
}

/// Build the query for one search step
///
/// `source` is the resource `Example` parameters are resolved from (normally
/// the run's primary example); `patient_id` feeds `Patient` parameters.
pub fn build(
    specs: &[SearchParameterSpec],
    source: Option<&Value>,
    patient_id: Option<&str>,
) -> Result<SearchParams, Unresolved> {
    let mut params = SearchParams::with_capacity(specs.len());

    for spec in specs {
        let value = match spec.origin {
            ValueOrigin::Patient => patient_id
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            ValueOrigin::Fixed(value) => Some(value.to_string()),
            ValueOrigin::Example => {
                source.and_then(|resource| resolve_value(resource, spec.path, spec.transform))
            }
        };

        match value {
            Some(value) => {
                params.insert(spec.name.to_string(), value);
            }
            None => {
                return Err(Unresolved {
                    param: spec.name.to_string(),
                });
            }
        }
    }

    Ok(params)
}

/// First value at `path` that survives `transform`
pub fn resolve_value(resource: &Value, path: &str, transform: ValueTransform) -> Option<String> {
    path::resolve_with(resource, path, &|candidate| {
        apply_transform(candidate, transform).is_some()
    })
    .and_then(|value| apply_transform(value, transform))
}

/// Shape a single resolved element into query syntax
pub fn apply_transform(value: &Value, transform: ValueTransform) -> Option<String> {
    match transform {
        ValueTransform::None => scalar(value),
        ValueTransform::DateOnly => match value {
            Value::String(text) => date_only(text),
            Value::Object(_) => value
                .get("start")
                .and_then(Value::as_str)
                .and_then(date_only),
            _ => None,
        },
        ValueTransform::CodeOnly => codes(value).into_iter().next().map(str::to_string),
        ValueTransform::ReferenceFormat(resource_type) => match value {
            Value::String(text) => reference_format(text, resource_type),
            Value::Object(_) => value
                .get("reference")
                .and_then(Value::as_str)
                .and_then(|text| reference_format(text, resource_type)),
            _ => None,
        },
    }
}

/// Whether `resource` carries `expected` for the parameter described by `spec`
///
/// Used to confirm that what a server returned actually matches what was asked
/// for. The resource's element goes through the same transform the query value
/// did; coded elements match on any of their codes and dates also match when
/// the requested day falls inside a Period.
pub fn matches(spec: &SearchParameterSpec, resource: &Value, expected: &str) -> bool {
    match spec.transform {
        ValueTransform::None => path::can_resolve(
            resource,
            spec.path,
            Some(&|candidate| scalar(candidate).as_deref() == Some(expected)),
        ),
        ValueTransform::CodeOnly => path::can_resolve(
            resource,
            spec.path,
            Some(&|candidate| codes(candidate).contains(&expected)),
        ),
        ValueTransform::DateOnly => path::can_resolve(
            resource,
            spec.path,
            Some(&|candidate| date_matches(candidate, expected)),
        ),
        ValueTransform::ReferenceFormat(resource_type) => {
            let Some(wanted) = reference_format(expected, resource_type) else {
                return false;
            };
            path::can_resolve(
                resource,
                spec.path,
                Some(&|candidate| {
                    apply_transform(candidate, spec.transform).as_deref() == Some(wanted.as_str())
                }),
            )
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn codes(value: &Value) -> Vec<&str> {
    match value {
        Value::String(text) if !text.is_empty() => vec![text.as_str()],
        Value::Object(fields) => {
            if let Some(Value::Array(codings)) = fields.get("coding") {
                return codings
                    .iter()
                    .filter_map(|coding| coding.get("code").and_then(Value::as_str))
                    .collect();
            }
            fields
                .get("code")
                .and_then(Value::as_str)
                .into_iter()
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Truncate a FHIR date/dateTime/instant to calendar-date granularity
///
/// Partial dates (`YYYY`, `YYYY-MM`) are already coarser than a day and are
/// kept as they are.
pub fn date_only(text: &str) -> Option<String> {
    let text = text.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.date_naive().format("%Y-%m-%d").to_string());
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(timestamp.date().format("%Y-%m-%d").to_string());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }

    let partial = match text.len() {
        4 => text.chars().all(|c| c.is_ascii_digit()),
        7 => {
            text.as_bytes()[4] == b'-'
                && text
                    .chars()
                    .enumerate()
                    .all(|(i, c)| i == 4 || c.is_ascii_digit())
        }
        _ => false,
    };
    partial.then(|| text.to_string())
}

fn date_matches(candidate: &Value, expected: &str) -> bool {
    match candidate {
        Value::String(text) => {
            date_only(text).is_some_and(|date| date.starts_with(expected))
        }
        Value::Object(period) => {
            let start = period.get("start").and_then(Value::as_str).and_then(date_only);
            let end = period.get("end").and_then(Value::as_str).and_then(date_only);
            if start.is_none() && end.is_none() {
                return false;
            }
            // YYYY-MM-DD strings order the same way the dates do
            start.is_none_or(|start| start.as_str() <= expected)
                && end.is_none_or(|end| expected <= end.as_str())
        }
        _ => false,
    }
}

fn reference_format(text: &str, resource_type: &str) -> Option<String> {
    let text = text.trim();
    if let Some(target) = ReferenceTarget::parse(text) {
        return Some(target.to_string());
    }
    if text.is_empty() || text.contains('/') || text.starts_with('#') {
        return None;
    }
    Some(format!("{resource_type}/{text}"))
}
