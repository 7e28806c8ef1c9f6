//! Must-support coverage across a result set

use indexmap::IndexMap;
use serde_json::Value;

use crate::path;
use crate::sequence::TestStepResult;

/// Drop a leading `Type.` segment (`Condition.code` -> `code`)
pub fn strip_type_prefix(element_path: &str) -> &str {
    match element_path.split_once('.') {
        Some((head, rest)) if head.starts_with(|c: char| c.is_ascii_uppercase()) => rest,
        _ => element_path,
    }
}

/// Per requirement, whether any resource carries the element
///
/// Resources are scanned in order and scanning stops at the first one that
/// satisfies the requirement.
pub fn verify(resources: &[Value], requirements: &[&str]) -> IndexMap<String, bool> {
    requirements
        .iter()
        .map(|requirement| {
            let element = strip_type_prefix(requirement);
            let satisfied = resources
                .iter()
                .any(|resource| path::can_resolve(resource, element, None));
            (requirement.to_string(), satisfied)
        })
        .collect()
}

/// Step outcome for must-support coverage; an uncovered element skips, never fails
pub fn check(resource_type: &str, resources: &[Value], requirements: &[&str]) -> TestStepResult {
    let coverage = verify(resources, requirements);

    match coverage.iter().find(|(_, satisfied)| !**satisfied) {
        Some((element, _)) => TestStepResult::skip(format!(
            "Could not find {element} in any of the {} provided {resource_type} resource(s)",
            resources.len()
        )),
        None => TestStepResult::pass(format!(
            "All {} must support elements are provided",
            coverage.len()
        )),
    }
}
