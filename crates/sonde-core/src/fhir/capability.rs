//! Server capability data
//!
//! The engine asks two questions of a server's declared capabilities: whether
//! an interaction is supported for a resource type, and whether a particular
//! combination of search parameters is documented. [`CapabilitySource`] is the
//! seam; [`CapabilityStatement`] answers from a parsed `/metadata` document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

use crate::error::SondeError;
use crate::result::Result;

/// US Core extension listing documented search parameter combinations
pub const SEARCH_COMBINATION_EXTENSION: &str =
    "http://hl7.org/fhir/StructureDefinition/capabilitystatement-search-parameter-combination";

/// RESTful interactions exercised by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interaction {
    Search,
    Read,
    Vread,
    History,
}

impl Interaction {
    /// Interaction code as written in a CapabilityStatement
    pub fn code(&self) -> &'static str {
        match self {
            Interaction::Search => "search-type",
            Interaction::Read => "read",
            Interaction::Vread => "vread",
            Interaction::History => "history-instance",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "search-type" | "search" => Some(Interaction::Search),
            "read" => Some(Interaction::Read),
            "vread" => Some(Interaction::Vread),
            "history-instance" | "history" => Some(Interaction::History),
            _ => None,
        }
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Interaction::Search => "search",
            Interaction::Read => "read",
            Interaction::Vread => "vread",
            Interaction::History => "history",
        };
        f.write_str(name)
    }
}

/// Capability questions asked by the engine
pub trait CapabilitySource: Send + Sync {
    /// Whether `interaction` is declared for `resource_type`
    fn supports(&self, resource_type: &str, interaction: Interaction) -> bool;

    /// Whether searching `resource_type` with exactly `param_names` is documented
    fn documented_search(&self, resource_type: &str, param_names: &[&str]) -> bool;
}

/// Declared capabilities of one resource type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceCapabilities {
    pub interactions: BTreeSet<Interaction>,
    pub search_params: BTreeSet<String>,
    pub search_combinations: Vec<BTreeSet<String>>,
}

/// Parsed server CapabilityStatement (`rest[mode=server].resource[]`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityStatement {
    resources: HashMap<String, ResourceCapabilities>,
}

impl CapabilityStatement {
    /// Parse the relevant parts of a CapabilityStatement document
    pub fn from_json(document: &Value) -> Result<Self> {
        if document.get("resourceType").and_then(Value::as_str) != Some("CapabilityStatement") {
            return Err(SondeError::invalid_response(
                "Capability data is not a CapabilityStatement",
            ));
        }

        let rest = document
            .get("rest")
            .and_then(Value::as_array)
            .ok_or_else(|| SondeError::invalid_response("CapabilityStatement has no rest entry"))?;

        let mut resources = HashMap::new();
        for rest_entry in rest {
            let mode = rest_entry.get("mode").and_then(Value::as_str);
            if mode.is_some_and(|mode| mode != "server") {
                continue;
            }

            let Some(entries) = rest_entry.get("resource").and_then(Value::as_array) else {
                continue;
            };

            for entry in entries {
                let Some(resource_type) = entry.get("type").and_then(Value::as_str) else {
                    continue;
                };
                resources.insert(resource_type.to_string(), parse_resource(entry));
            }
        }

        debug!("Parsed capabilities for {} resource types", resources.len());
        Ok(Self { resources })
    }

    /// Declared capabilities for one resource type
    pub fn resource(&self, resource_type: &str) -> Option<&ResourceCapabilities> {
        self.resources.get(resource_type)
    }
}

fn parse_resource(entry: &Value) -> ResourceCapabilities {
    let interactions = entry
        .get("interaction")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|interaction| interaction.get("code").and_then(Value::as_str))
        .filter_map(Interaction::from_code)
        .collect();

    let search_params = entry
        .get("searchParam")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|param| param.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    let search_combinations = entry
        .get("extension")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|ext| ext.get("url").and_then(Value::as_str) == Some(SEARCH_COMBINATION_EXTENSION))
        .map(|ext| {
            ext.get("extension")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter(|part| part.get("url").and_then(Value::as_str) == Some("required"))
                .filter_map(|part| part.get("valueString").and_then(Value::as_str))
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
        })
        .filter(|combination| !combination.is_empty())
        .collect();

    ResourceCapabilities {
        interactions,
        search_params,
        search_combinations,
    }
}

impl CapabilitySource for CapabilityStatement {
    fn supports(&self, resource_type: &str, interaction: Interaction) -> bool {
        self.resource(resource_type)
            .is_some_and(|resource| resource.interactions.contains(&interaction))
    }

    fn documented_search(&self, resource_type: &str, param_names: &[&str]) -> bool {
        let Some(resource) = self.resource(resource_type) else {
            return false;
        };

        match param_names {
            [] => false,
            [single] => resource.search_params.contains(*single),
            _ => {
                let requested: BTreeSet<String> =
                    param_names.iter().map(|name| name.to_string()).collect();
                resource
                    .search_combinations
                    .iter()
                    .any(|combination| *combination == requested)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn statement() -> CapabilityStatement {
        CapabilityStatement::from_json(&json!({
            "resourceType": "CapabilityStatement",
            "rest": [{
                "mode": "server",
                "resource": [{
                    "type": "Condition",
                    "interaction": [{"code": "read"}, {"code": "search-type"}],
                    "searchParam": [{"name": "patient"}, {"name": "clinical-status"}],
                    "extension": [{
                        "url": SEARCH_COMBINATION_EXTENSION,
                        "extension": [
                            {"url": "required", "valueString": "patient"},
                            {"url": "required", "valueString": "category"}
                        ]
                    }]
                }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_supports_declared_interactions() {
        let caps = statement();
        assert!(caps.supports("Condition", Interaction::Read));
        assert!(caps.supports("Condition", Interaction::Search));
        assert!(!caps.supports("Condition", Interaction::Vread));
        assert!(!caps.supports("Goal", Interaction::Read));
    }

    #[test]
    fn test_documented_single_parameter() {
        let caps = statement();
        assert!(caps.documented_search("Condition", &["patient"]));
        assert!(!caps.documented_search("Condition", &["code"]));
    }

    #[test]
    fn test_documented_combination_is_order_independent() {
        let caps = statement();
        assert!(caps.documented_search("Condition", &["category", "patient"]));
        assert!(!caps.documented_search("Condition", &["patient", "clinical-status"]));
    }

    #[test]
    fn test_rejects_other_documents() {
        let result = CapabilityStatement::from_json(&json!({"resourceType": "Patient"}));
        assert!(result.is_err());
    }
}
