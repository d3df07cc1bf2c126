//! Funcsync CLI entrypoint.
//!
//! This is the main entrypoint for the funcsync command-line tool.

use std::process::ExitCode;

use funcsync::cli::{Cli, OutputFormat, OutputFormatter};
use funcsync::config::{DEFAULT_GLUE_FILES, REFLECTION_FILE};
use funcsync::deploy::deploy;
use funcsync::error::{ConfigError, Result, SyncError};

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", describe(&e));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` overrides the verbosity flag.
fn init_logging(verbose: bool, format: OutputFormat) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        OutputFormat::Json => builder.json().init(),
        OutputFormat::Text => builder.init(),
    }
}

/// Main async entry point.
#[allow(clippy::print_stdout)]
async fn run(cli: &Cli) -> Result<()> {
    let options = cli.deploy_options();
    debug!("Deploying with {options:?}");
    let outcome = deploy(&options).await?;

    let formatter = OutputFormatter::new(cli.output);
    println!("{}", formatter.format_outcome(&outcome));
    Ok(())
}

/// Operator-facing message for a failed run.
fn describe(error: &SyncError) -> String {
    match error {
        SyncError::Config(ConfigError::FileNotFound { path })
            if path.ends_with(REFLECTION_FILE) =>
        {
            format!("Missing reflection document: {}", path.display())
        }
        SyncError::Config(ConfigError::FileNotFound { path })
            if DEFAULT_GLUE_FILES.iter().any(|name| path.ends_with(name)) =>
        {
            format!(
                "Glue not found at {}. Check for a glue project you can clone next to this project.",
                path.display()
            )
        }
        other => format!("Error: {other}"),
    }
}
