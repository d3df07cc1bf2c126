//! Public deployment entry point.
//!
//! Loads a project's input documents, validates them, resolves credentials,
//! packages the declared functions and syncs the resulting scope.

use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::{
    ConfigParser, ConfigValidator, CredentialCache, DirectoryPackager, GlueConfig, Packager,
    Reflection, Scope,
};
use crate::error::Result;
use crate::provider::{AwsProvider, Provider, ProviderClient, StateReader};
use crate::reconciler::{Reconciler, SyncOutcome};

/// Stage directory holding packaged archives, relative to the project.
pub const DEFAULT_STAGE_DIR: &str = ".funcsync/stage";

/// Inputs of one deployment.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Target environment name.
    pub environment: String,
    /// Project directory holding the reflection document.
    pub project_path: PathBuf,
    /// Glue file replacing the project default.
    pub glue_file: Option<PathBuf>,
    /// Directory of packaged archives.
    pub stage_dir: Option<PathBuf>,
    /// Credentials profile, the environment name when unset.
    pub profile: Option<String>,
    /// Base URL replacing every provider endpoint.
    pub endpoint: Option<String>,
}

impl DeployOptions {
    /// Creates options for `environment` and `project_path`.
    #[must_use]
    pub fn new(environment: impl Into<String>, project_path: impl Into<PathBuf>) -> Self {
        Self {
            environment: environment.into(),
            project_path: project_path.into(),
            ..Self::default()
        }
    }

    /// Sets the glue file override.
    #[must_use]
    pub fn with_glue_file(mut self, glue_file: Option<PathBuf>) -> Self {
        self.glue_file = glue_file;
        self
    }

    /// Sets the stage directory.
    #[must_use]
    pub fn with_stage_dir(mut self, stage_dir: Option<PathBuf>) -> Self {
        self.stage_dir = stage_dir;
        self
    }

    /// Sets the credentials profile.
    #[must_use]
    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    /// Sets the endpoint override.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    fn stage_dir(&self) -> PathBuf {
        self.stage_dir
            .clone()
            .unwrap_or_else(|| self.project_path.join(DEFAULT_STAGE_DIR))
    }
}

/// Deploys a project to an environment.
///
/// # Errors
///
/// Returns an error if an input document is missing or invalid, no
/// credentials are found, packaging fails, or any sync stage fails.
pub async fn deploy(options: &DeployOptions) -> Result<SyncOutcome> {
    let (reflection, glue) = load_project(options)?;

    let profile = options.profile.as_deref().unwrap_or(&options.environment);
    let credentials = CredentialCache::new().resolve(None, profile)?;
    debug!("Using credentials {credentials:?}");
    let client = ProviderClient::new(credentials, options.endpoint.clone())?;
    let provider = AwsProvider::new(client);
    let packager = DirectoryPackager::new(options.stage_dir());

    sync_project(&provider, &packager, &options.environment, &reflection, &glue).await
}

/// Loads and validates the reflection document and glue file.
///
/// # Errors
///
/// Returns an error if a document is missing, malformed or invalid.
pub fn load_project(options: &DeployOptions) -> Result<(Reflection, GlueConfig)> {
    let parser = ConfigParser::new().with_base_path(&options.project_path);
    parser.load_dotenv()?;
    let reflection = parser.load_reflection()?;
    let glue = parser.load_glue(options.glue_file.as_deref())?;

    let validation = ConfigValidator::new().validate(&options.environment, &reflection, &glue)?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }
    Ok((reflection, glue))
}

/// Syncs validated documents through `provider`.
///
/// The current state is read while the functions are packaged.
///
/// # Errors
///
/// Returns an error if packaging or any sync stage fails.
pub async fn sync_project<P: Provider + ?Sized>(
    provider: &P,
    packager: &dyn Packager,
    environment: &str,
    reflection: &Reflection,
    glue: &GlueConfig,
) -> Result<SyncOutcome> {
    let scope = Scope::new(environment, glue.service.as_str());
    info!(
        "Deploying {} functions of {} to {}",
        reflection.len(),
        reflection.name,
        scope
    );

    let declared = reflection.functions();
    let reader = StateReader::new(provider);
    let (current, artifacts) =
        tokio::try_join!(reader.read(&scope), async { packager.package(&declared) })?;

    Reconciler::new(provider, &scope, reflection, glue, &artifacts)
        .reconcile(&current)
        .await
}
