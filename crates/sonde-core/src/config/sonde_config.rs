//! Configuration types for sonde

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::catalog;
use crate::client::DEFAULT_TIMEOUT;
use crate::error::SondeError;
use crate::result::Result;

/// Server under test
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfiguration {
    #[schemars(description = "FHIR base URL of the server under test")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[schemars(description = "Bearer token sent with every request except the unauthorized search")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    #[schemars(description = "Per-request timeout in seconds")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// External profile validator
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorConfiguration {
    /// Base URL of a FHIR validation service; structural checks only when unset
    #[schemars(description = "Base URL of a FHIR validation service exposing POST /validate")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Top-level sonde configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SondeConfig {
    #[serde(default)]
    pub server: ServerConfiguration,

    #[schemars(description = "Patient whose data the sequences search for")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<ValidatorConfiguration>,

    #[schemars(description = "Resource types to test; every catalog entry when unset")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
}

impl SondeConfig {
    /// Load configuration from a `.json`, `.toml`, `.yaml` or `.yml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| SondeError::io_error(path, e))?;
        let parse_error =
            |e: &dyn std::fmt::Display| SondeError::config_error(format!("{}: {e}", path.display()));

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| parse_error(&e)),
            Some("toml") => toml::from_str(&content).map_err(|e| parse_error(&e)),
            Some("json") => serde_json::from_str(&content).map_err(|e| parse_error(&e)),
            _ => Err(SondeError::config_error(format!(
                "Unsupported config file extension for {} (expected .json, .toml, .yaml or .yml)",
                path.display()
            ))),
        }
    }

    /// Write the configuration, choosing the format from the extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)
                .map_err(|e| SondeError::config_error(e.to_string()))?,
            Some("toml") => toml::to_string_pretty(self)
                .map_err(|e| SondeError::config_error(e.to_string()))?,
            _ => serde_json::to_string_pretty(self)?,
        };
        fs::write(path, content).map_err(|e| SondeError::io_error(path, e))
    }

    /// Apply `SONDE_*` overrides read through `lookup`
    ///
    /// Recognized: `SONDE_SERVER_URL`, `SONDE_BEARER_TOKEN`, `SONDE_PATIENT_ID`,
    /// `SONDE_VALIDATOR_URL`, `SONDE_TIMEOUT_SECS`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("SONDE_SERVER_URL") {
            self.server.base_url = Some(url);
        }
        if let Some(token) = lookup("SONDE_BEARER_TOKEN") {
            self.server.bearer_token = Some(token);
        }
        if let Some(patient) = lookup("SONDE_PATIENT_ID") {
            self.patient_id = Some(patient);
        }
        if let Some(url) = lookup("SONDE_VALIDATOR_URL") {
            self.validator = Some(ValidatorConfiguration { url: Some(url) });
        }
        if let Some(timeout) = lookup("SONDE_TIMEOUT_SECS") {
            let secs = timeout.parse().map_err(|_| {
                SondeError::config_error(format!("SONDE_TIMEOUT_SECS is not a number: {timeout}"))
            })?;
            self.server.timeout_secs = Some(secs);
        }
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok().filter(|value| !value.is_empty()))
    }

    /// Check that a run can be started from this configuration
    pub fn validate(&self) -> Result<()> {
        let Some(base_url) = self.server.base_url.as_deref() else {
            return Err(SondeError::config_error("server.baseUrl is not set"));
        };
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SondeError::config_error(format!(
                "server.baseUrl must be an http(s) URL: {base_url}"
            )));
        }
        if self.server.timeout_secs == Some(0) {
            return Err(SondeError::config_error("server.timeoutSecs must be positive"));
        }
        if self.patient_id.as_deref().is_none_or(str::is_empty) {
            return Err(SondeError::config_error("patientId is not set"));
        }
        for resource_type in self.resource_types() {
            catalog::lookup(&resource_type)?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        self.server
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Resource types to run, defaulting to the whole catalog
    pub fn resource_types(&self) -> Vec<String> {
        match &self.resources {
            Some(resources) if !resources.is_empty() => resources.clone(),
            _ => catalog::resource_types().map(str::to_string).collect(),
        }
    }

    pub fn validator_url(&self) -> Option<&str> {
        self.validator.as_ref().and_then(|v| v.url.as_deref())
    }

    /// Starter configuration written by `sonde config init`
    pub fn example() -> Self {
        Self {
            server: ServerConfiguration {
                base_url: Some("http://localhost:8080/fhir".to_string()),
                bearer_token: None,
                timeout_secs: Some(DEFAULT_TIMEOUT.as_secs()),
            },
            patient_id: Some("example".to_string()),
            validator: None,
            resources: Some(catalog::resource_types().map(str::to_string).collect()),
        }
    }

    /// JSON Schema of the configuration file
    pub fn json_schema() -> Result<serde_json::Value> {
        Ok(serde_json::to_value(schemars::schema_for!(SondeConfig))?)
    }
}
