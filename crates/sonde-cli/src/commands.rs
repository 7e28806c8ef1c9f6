//! Command implementations

use anyhow::{Context, bail};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use sonde_core::catalog;
use sonde_core::{
    BasicValidator, CapabilitySource, CapabilityStatement, ConfigLoader, ErrorKind,
    HttpTransport, InteractionClient, ProfileValidator, RemoteValidator, ResultExt, RunContext,
    SequenceRunner, SondeConfig, Transport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::output::{OutputFormatter, RunSummary};
use crate::{ConfigFormat, OutputFormat};

/// Values given on the `run` command line, applied over the config file
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub resources: Vec<String>,
    pub server: Option<String>,
    pub patient: Option<String>,
    pub token: Option<String>,
    pub validator: Option<String>,
    pub timeout: Option<u64>,
}

impl RunOverrides {
    fn apply(self, config: &mut SondeConfig) {
        if !self.resources.is_empty() {
            config.resources = Some(self.resources);
        }
        if let Some(server) = self.server {
            config.server.base_url = Some(server);
        }
        if let Some(patient) = self.patient {
            config.patient_id = Some(patient);
        }
        if let Some(token) = self.token {
            config.server.bearer_token = Some(token);
        }
        if let Some(url) = self.validator {
            config.validator = Some(sonde_core::config::ValidatorConfiguration { url: Some(url) });
        }
        if let Some(timeout) = self.timeout {
            config.server.timeout_secs = Some(timeout);
        }
    }
}

/// Load the effective configuration: file, then environment, then flags
fn effective_config(
    config_path: Option<PathBuf>,
    overrides: RunOverrides,
) -> anyhow::Result<SondeConfig> {
    let mut config = ConfigLoader::load(config_path.as_deref(), None)
        .context("Failed to load configuration")?;
    config.apply_env()?;
    overrides.apply(&mut config);
    Ok(config)
}

/// Run command implementation
///
/// Returns `false` when any sequence failed.
pub async fn run_command(
    config_path: Option<PathBuf>,
    overrides: RunOverrides,
    format: OutputFormat,
    progress: bool,
) -> anyhow::Result<bool> {
    let config = effective_config(config_path, overrides)?;
    config.validate().context("Invalid configuration")?;

    // validate() guarantees both are set
    let base_url = config.server.base_url.clone().unwrap_or_default();
    let patient_id = config.patient_id.clone().unwrap_or_default();

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.timeout())?);
    let client = InteractionClient::new(&base_url, transport.clone())
        .with_bearer_token(config.server.bearer_token.clone());

    info!("Fetching capability statement from {}", client.base_url());
    let capabilities = capability_source(client.capability_statement().await)
        .with_context(|| format!("Could not reach {base_url}"))?;

    let validator: Arc<dyn ProfileValidator> = match config.validator_url() {
        Some(url) => {
            debug!("Using remote validator at {url}");
            Arc::new(RemoteValidator::new(url, transport.clone()))
        }
        None => Arc::new(BasicValidator),
    };

    let runner = SequenceRunner::new(client, validator);
    let abort = runner.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current step");
            abort.abort();
        }
    });

    let spinner = (progress && format == OutputFormat::Human).then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let mut results = Vec::new();
    for resource_type in config.resource_types() {
        let spec = catalog::lookup(&resource_type)?;
        if let Some(pb) = &spinner {
            pb.set_message(format!("Running {} sequence...", spec.resource_type));
        }

        let mut ctx = RunContext::new(spec.resource_type)
            .with_patient(patient_id.as_str())
            .with_bearer_token(config.server.bearer_token.clone())
            .with_capabilities(capabilities.clone());
        let result = runner.run(spec, &mut ctx).await;
        info!(
            "{} sequence finished: {:?}",
            result.resource_type, result.outcome
        );

        let aborted = result.aborted;
        results.push(result);
        if aborted {
            break;
        }
    }

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let summary = RunSummary::from_results(&results);
    OutputFormatter::new(format, colored::control::SHOULD_COLORIZE.should_colorize())
        .print_results(&base_url, &results, &summary)?;

    Ok(!summary.has_failures() && !summary.aborted)
}

/// Capability data for the run
///
/// An unreachable server ends the run. A malformed statement only means
/// every capability-gated step is skipped.
fn capability_source(
    fetched: sonde_core::Result<CapabilityStatement>,
) -> sonde_core::Result<Option<Arc<dyn CapabilitySource>>> {
    let capabilities = match fetched {
        Err(err) if err.kind() == ErrorKind::Transport => return Err(err),
        fetched => fetched.recoverable()?,
    }
    .map(|statement| Arc::new(statement) as Arc<dyn CapabilitySource>);
    if capabilities.is_none() {
        warn!("Continuing without a capability statement; every step will be skipped");
    }
    Ok(capabilities)
}

/// Resources command implementation
pub fn resources_command(detailed: bool) {
    println!("{}", "Testable resource types:".bold());
    for resource_type in catalog::resource_types() {
        let Ok(spec) = catalog::lookup(resource_type) else {
            continue;
        };
        println!("  {} {}", spec.resource_type.green(), spec.title.dimmed());
        if detailed {
            println!("    profile: {}", spec.profile);
            for search in spec.searches {
                let kind = if search.optional { "optional" } else { "required" };
                println!("    search:  {} ({kind})", search.label());
            }
            let interactions: Vec<String> =
                spec.interactions.iter().map(ToString::to_string).collect();
            println!("    interactions: {}", interactions.join(", "));
            println!("    must support: {}", spec.must_support.join(", "));
        }
    }
}

/// Config init command implementation
pub fn config_init_command(format: ConfigFormat, force: bool) -> anyhow::Result<()> {
    debug!("Initializing configuration file with format: {:?}", format);

    let filename = match format {
        ConfigFormat::Json => ".sonderc.json",
        ConfigFormat::Toml => ".sonderc.toml",
        ConfigFormat::Yaml => "sonde.yaml",
    };
    let config_path = PathBuf::from(filename);

    if config_path.exists() && !force {
        bail!("Configuration file '{filename}' already exists. Use --force to overwrite.");
    }

    SondeConfig::example()
        .save(&config_path)
        .with_context(|| format!("Failed to write {filename}"))?;

    println!("✅ Created configuration file: {filename}");
    println!("   Set server.baseUrl and patientId before running sequences.");
    Ok(())
}

/// Config validate command implementation
pub fn config_validate_command(path: Option<PathBuf>) -> anyhow::Result<()> {
    debug!("Validating configuration file: {:?}", path);

    let path = match path {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir()?;
            ConfigLoader::auto_discover(&cwd)?
                .context("No configuration file found in the current directory or its parents")?
        }
    };

    let mut config = ConfigLoader::load_from_file(&path)?;
    config.apply_env()?;
    config
        .validate()
        .with_context(|| format!("{} is not a usable configuration", path.display()))?;

    println!("✅ Configuration is valid: {}", path.display());
    Ok(())
}

/// Config show command implementation
pub fn config_show_command(config_path: Option<PathBuf>, show_secrets: bool) -> anyhow::Result<()> {
    let mut config = effective_config(config_path, RunOverrides::default())?;
    if !show_secrets && config.server.bearer_token.is_some() {
        config.server.bearer_token = Some("********".to_string());
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Config schema command implementation
pub fn config_schema_command() -> anyhow::Result<()> {
    let schema = SondeConfig::json_schema()?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Version command implementation
pub fn version_command(detailed: bool) {
    println!("sonde {}", sonde_core::VERSION);
    if detailed {
        println!("  engine: {} {}", sonde_core::NAME, sonde_core::VERSION);
        let types: Vec<&str> = catalog::resource_types().collect();
        println!("  resource types: {}", types.join(", "));
    }
}
