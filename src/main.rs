//! Spanner CRUD Harness - provision, verify, tear down.
//!
//! Usage:
//!   spanner-crud-harness [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>      Path to configuration file
//!   --dry-run                Print the generated run plan and exit
//!   --skip-verification      Provision and tear down without calling the service
//!   -v, --verbose            Enable verbose logging
//!   --json-logs              Output logs in JSON format
//!   -V, --version            Print version information
//!   -h, --help               Print help

use anyhow::{Context, Result};
use clap::Parser;
use spanner_crud_harness::{
    admin, config::Config, lifecycle::LifecycleRunner, verifier::CrudVerifier,
};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Spanner CRUD Harness - end-to-end check of a Spanner-backed CRUD service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the generated run plan and exit without remote calls
    #[arg(long)]
    dry_run: bool,

    /// Provision and tear down only; do not call the service
    #[arg(long)]
    skip_verification: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = load_config(&args)?;
    if args.skip_verification {
        config.verification.enabled = false;
    }

    // Setup logging
    setup_logging(&args, &config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Spanner CRUD Harness"
    );

    let runner = LifecycleRunner::from_config(&config).context("Failed to plan the run")?;

    // Handle dry-run mode
    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(runner.plan())?);
        return Ok(());
    }

    let admin = admin::create_admin_client(&config.spanner)
        .context("Failed to create Spanner admin client")?;
    let verifier = CrudVerifier::new(&config.service.url, config.service.response_timeout())
        .context("Failed to create service client")?;

    let report = match runner.run(admin, &verifier).await {
        Ok(report) => report,
        Err(failure) => {
            // Leftover resources need manual cleanup, so surface them too.
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&failure.teardown)?
            );
            return Err(failure.into());
        }
    };

    info!(
        database = %report.plan.database.database,
        teardown_clean = report.teardown.is_clean(),
        "Harness finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref path) = args.config {
        Config::from_file(path).context(format!("Failed to load config from {:?}", path))
    } else {
        Config::from_env().context("Failed to load config from environment")
    }
}

fn setup_logging(args: &Args, config: &Config) -> Result<()> {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        config.logging.level.into()
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("spanner_crud_harness={}", level).parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("hyper=warn".parse()?);

    let use_json =
        args.json_logs || config.logging.format == spanner_crud_harness::config::LogFormat::Json;

    if use_json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
    Ok(())
}
