//! Sonde Core
//!
//! Sequence execution and validation engine for FHIR server conformance
//! testing. Drives a server through scripted search, read, vread and history
//! interactions for one resource type at a time and classifies every step as
//! pass, fail, skip, warning or error.

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod fhir;
pub mod must_support;
pub mod path;
pub mod references;
pub mod result;
pub mod search;
pub mod sequence;
pub mod validation;

// Re-export commonly used types
pub use catalog::{ResourceSpec, SearchDefinition, StatusFallback};
pub use client::{Auth, FhirResponse, HttpTransport, InteractionClient, Transport};
pub use config::{ConfigLoader, SondeConfig};
pub use error::{ErrorKind, SondeError};
pub use fhir::{CapabilitySource, CapabilityStatement, Interaction, ReferenceTarget};
pub use references::{FoundReference, ReferenceOutcome};
pub use result::{Result, ResultExt};
pub use search::{SearchParameterSpec, SearchParams, SearchProtocol, ValueTransform};
pub use sequence::{
    AbortHandle, RunContext, SequenceOutcome, SequenceResult, SequenceRunner, StepReport,
    StepStatus, TestStep, TestStepResult,
};
pub use validation::{BasicValidator, ProfileValidator, RemoteValidator};

/// Initialize the tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sonde=info,sonde_core=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
