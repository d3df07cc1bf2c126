//! CLI argument definitions.
//!
//! This module defines the command line using clap.

use clap::Parser;
use std::path::PathBuf;

use crate::deploy::DeployOptions;

/// Funcsync - serverless function deployment synchronizer.
///
/// With a single positional argument, that argument is the environment and
/// the project is the current directory.
#[derive(Parser, Debug)]
#[command(name = "funcsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project directory, or the environment name when given alone.
    pub path_or_environment: String,

    /// Target environment name.
    pub environment: Option<String>,

    /// Glue file replacing the project default.
    pub glue_file: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text")]
    pub output: OutputFormat,

    /// Log line format (text, json).
    #[arg(long, default_value = "text")]
    pub log_format: OutputFormat,

    /// Credentials profile (defaults to the environment name).
    #[arg(long, env = "FUNCSYNC_PROFILE")]
    pub profile: Option<String>,

    /// Directory of packaged function archives.
    #[arg(long, env = "FUNCSYNC_STAGE_DIR")]
    pub stage_dir: Option<PathBuf>,

    /// Base URL replacing every provider endpoint.
    #[arg(long, env = "FUNCSYNC_ENDPOINT_URL", hide_env_values = true)]
    pub endpoint_url: Option<String>,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Target environment name.
    #[must_use]
    pub fn environment(&self) -> &str {
        self.environment
            .as_deref()
            .unwrap_or(&self.path_or_environment)
    }

    /// Project directory.
    #[must_use]
    pub fn project_path(&self) -> PathBuf {
        if self.environment.is_some() {
            PathBuf::from(&self.path_or_environment)
        } else {
            PathBuf::from(".")
        }
    }

    /// Deployment inputs described by the arguments.
    #[must_use]
    pub fn deploy_options(&self) -> DeployOptions {
        DeployOptions::new(self.environment(), self.project_path())
            .with_glue_file(self.glue_file.clone())
            .with_stage_dir(self.stage_dir.clone())
            .with_profile(self.profile.clone())
            .with_endpoint(self.endpoint_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_environment_and_glue() {
        let cli = Cli::try_parse_from(["funcsync", "./app", "prod", "glue.staging.yaml"])
            .expect("parse");
        let options = cli.deploy_options();
        assert_eq!(options.environment, "prod");
        assert_eq!(options.project_path, PathBuf::from("./app"));
        assert_eq!(options.glue_file, Some(PathBuf::from("glue.staging.yaml")));
    }

    #[test]
    fn test_single_argument_is_the_environment() {
        let cli = Cli::try_parse_from(["funcsync", "dev"]).expect("parse");
        assert_eq!(cli.environment(), "dev");
        assert_eq!(cli.project_path(), PathBuf::from("."));
        assert!(cli.glue_file.is_none());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "funcsync",
            "app",
            "dev",
            "-v",
            "--output",
            "json",
            "--log-format",
            "json",
            "--profile",
            "ci",
        ])
        .expect("parse");
        assert!(cli.verbose);
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.log_format, OutputFormat::Json);
        assert_eq!(cli.deploy_options().profile.as_deref(), Some("ci"));
    }

    #[test]
    fn test_environment_is_required() {
        assert!(Cli::try_parse_from(["funcsync"]).is_err());
    }
}
