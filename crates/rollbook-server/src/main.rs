//! Rollbook - Entry point
//!
//! Starts the Rollbook LTI attendance server.

use std::path::PathBuf;

use anyhow::Context;
use rollbook_config::{ConfigLoader, RollbookConfig};
use tracing::info;

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
    /// Start from the development preset.
    development: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut development = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--dev" | "-d" => {
                    development = true;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("rollbook {}", rollbook_server::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self {
            config,
            development,
        }
    }
}

fn print_help() {
    println!(
        r"Rollbook - LTI attendance add-on

USAGE:
    rollbook [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -d, --dev              Start from development defaults
    -h, --help             Print help information
    -v, --version          Print version information

Without --config, ./rollbook.toml is read if it exists. A .env file in the
working directory is loaded before environment overrides are applied.

ENVIRONMENT VARIABLES:
    ROLLBOOK__SERVER__HTTP_ADDR           Listen address (default: 0.0.0.0:8080)
    ROLLBOOK__SERVER__SECURE_COOKIES      Mark session cookies Secure (default: true)
    ROLLBOOK__LMS__HEALTH_CHECK_URL       LMS url checked by /readiness
    ROLLBOOK__LMS__INSTANCES              guid=base_url, comma-separated
    ROLLBOOK__LMS__ACCESS_TOKENS          guid:user_id:token, comma-separated
    ROLLBOOK__GRADE_SYNC__RETRY_LIMIT     Lock contention retries per job (default: 5)
    ROLLBOOK__TELEMETRY__LOGGING__LEVEL   Log level (default: info)
    ROLLBOOK__TELEMETRY__LOGGING__FORMAT  json or pretty

EXAMPLES:
    # Run with configuration file
    rollbook --config /etc/rollbook/rollbook.toml

    # Run locally
    ROLLBOOK__SERVER__HTTP_ADDR=127.0.0.1:3001 rollbook --dev
"
    );
}

fn load_config(args: &Args) -> anyhow::Result<RollbookConfig> {
    let loader = if args.development {
        ConfigLoader::new().with_development()
    } else {
        ConfigLoader::new()
    };

    let loader = match &args.config {
        Some(path) => loader
            .with_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => loader.with_optional_file("rollbook.toml")?,
    };

    loader
        .with_dotenv()?
        .with_env_prefix("ROLLBOOK")
        .load()
        .context("invalid configuration")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    rollbook_telemetry::init_telemetry(&config.telemetry.to_telemetry_config())
        .context("failed to initialize telemetry")?;

    info!(
        version = rollbook_server::VERSION,
        environment = %config.telemetry.environment,
        http_addr = %config.server.http_addr,
        "Starting Rollbook"
    );

    let server = rollbook_server::build_server(&config).context("failed to build server")?;
    server.run().await.context("server error")?;

    Ok(())
}
