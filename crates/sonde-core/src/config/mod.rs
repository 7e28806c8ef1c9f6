//! Configuration system for sonde
//!
//! - JSON, TOML and YAML configuration files
//! - Auto-discovery by traversing up directories
//! - `SONDE_*` environment overrides
//! - JSON Schema generation via schemars
//!
//! ## Example Configuration
//!
//! ```yaml
//! server:
//!   baseUrl: https://fhir.example.org/r4
//!   bearerToken: eyJhbGciOi...
//!   timeoutSecs: 30
//! patientId: "85"
//! validator:
//!   url: http://localhost:4567
//! resources:
//!   - Condition
//!   - Goal
//! ```

mod loader;
mod sonde_config;

pub use loader::{CONFIG_FILE_NAMES, ConfigLoader};
pub use sonde_config::{ServerConfiguration, SondeConfig, ValidatorConfiguration};
