//! Sonde CLI
//!
//! Command-line interface for running FHIR conformance sequences

mod commands;
mod output;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use sonde_core::init_tracing;
use std::io;
use std::path::PathBuf;
use tracing::error;

#[derive(Parser)]
#[command(name = "sonde")]
#[command(about = "Sonde: conformance sequences for FHIR servers")]
#[command(version = sonde_core::VERSION)]
#[command(
    long_about = "Sonde drives a FHIR server through scripted search, read, vread and history\n\
interactions for one resource type at a time and reports every step as\n\
pass, fail, skip, warning or error.\n\
\n\
Examples:\n  \
sonde run --server https://fhir.example.org/r4 --patient 85\n  \
sonde run -r Condition -r Goal --format json\n  \
sonde resources              # List testable resource types\n  \
sonde config init            # Initialize configuration file"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        help = "Path to configuration file (.sonderc.json/.sonderc.toml/sonde.yaml)"
    )]
    config: Option<PathBuf>,

    /// Verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Generate shell completion script
    #[arg(
        long,
        value_enum,
        help = "Generate completion script for specified shell"
    )]
    generate_completion: Option<Shell>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run conformance sequences against a FHIR server
    Run {
        /// Resource types to test
        #[arg(
            short,
            long = "resource",
            value_name = "TYPE",
            help = "Resource type to test (repeatable, default: every catalog entry)"
        )]
        resources: Vec<String>,

        /// FHIR server base URL
        #[arg(short, long, value_name = "URL")]
        server: Option<String>,

        /// Patient whose data is searched
        #[arg(short, long, value_name = "ID")]
        patient: Option<String>,

        /// Bearer token for authorized requests
        #[arg(long, env = "SONDE_BEARER_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Remote validator base URL
        #[arg(long, value_name = "URL")]
        validator: Option<String>,

        /// Request timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Show a spinner while sequences run
        #[arg(long)]
        progress: bool,
    },

    /// List the resource types that can be tested
    Resources {
        /// Show profile and search details
        #[arg(long)]
        detailed: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information
    Version {
        /// Show detailed version information
        #[arg(long)]
        detailed: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize a new configuration file
    Init {
        /// Configuration format
        #[arg(long, value_enum, default_value = "json")]
        format: ConfigFormat,

        /// Overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        path: Option<PathBuf>,
    },

    /// Show the effective configuration
    Show {
        /// Include the bearer token in the output
        #[arg(long)]
        show_secrets: bool,
    },

    /// Print the JSON Schema of the configuration file
    Schema,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Human-readable output with colors
    Human,
    /// JSON format for programmatic consumption
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// TOML configuration format
    Toml,
    /// YAML configuration format
    Yaml,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Handle shell completion generation
    if let Some(shell) = cli.generate_completion {
        generate_completion_script(shell);
        return;
    }

    if !cli.no_color && std::env::var("NO_COLOR").is_err() {
        colored::control::set_override(true);
    } else {
        colored::control::set_override(false);
    }

    let log_level = match cli.verbose {
        0 => "sonde=error,sonde_core=error",
        1 => "sonde=warn,sonde_core=warn",
        2 => "sonde=info,sonde_core=info",
        3 => "sonde=debug,sonde_core=debug",
        _ => "sonde=trace,sonde_core=trace",
    };
    unsafe {
        std::env::set_var("RUST_LOG", log_level);
    }
    init_tracing();

    match run_command(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

fn generate_completion_script(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

/// Dispatch the parsed command; `Ok(false)` means a sequence failed
async fn run_command(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Some(Commands::Run {
            resources,
            server,
            patient,
            token,
            validator,
            timeout,
            format,
            progress,
        }) => {
            let overrides = commands::RunOverrides {
                resources,
                server,
                patient,
                token,
                validator,
                timeout,
            };
            commands::run_command(cli.config, overrides, format, progress).await
        }

        Some(Commands::Resources { detailed }) => {
            commands::resources_command(detailed);
            Ok(true)
        }

        Some(Commands::Config { action }) => {
            match action {
                ConfigAction::Init { format, force } => {
                    commands::config_init_command(format, force)?
                }
                ConfigAction::Validate { path } => {
                    commands::config_validate_command(path.or(cli.config))?
                }
                ConfigAction::Show { show_secrets } => {
                    commands::config_show_command(cli.config, show_secrets)?
                }
                ConfigAction::Schema => commands::config_schema_command()?,
            }
            Ok(true)
        }

        Some(Commands::Version { detailed }) => {
            commands::version_command(detailed);
            Ok(true)
        }

        None => {
            Cli::command().print_help()?;
            Ok(true)
        }
    }
}
