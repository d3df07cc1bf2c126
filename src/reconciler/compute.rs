//! Compute reconciler.
//!
//! Creates missing functions, deletes surplus ones and updates code and
//! configuration of existing ones. Each phase runs its calls concurrently;
//! the phases themselves run in that order.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::future::try_join_all;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

use crate::config::{DeclaredFunction, PackagedArtifact};
use crate::error::{ConfigError, Result};
use crate::planner::{Change, DiffEngine, Named, ResourceKind};
use crate::provider::{
    CreateFunctionRequest, EnvironmentVariables, FunctionCode, FunctionConfiguration, Provider,
    RemoteFunction, TracingConfig, UpdateCodeRequest,
};

use super::SyncContext;

/// Entry point of every packaged function.
const HANDLER: &str = "index.handler";

/// A function known to exist after the compute phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedFunction {
    /// Short name.
    pub name: String,
    /// Provider identifier (ARN).
    pub id: String,
}

impl Named for DeployedFunction {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Reconciler for compute units.
#[derive(Debug)]
pub struct ComputeReconciler<'a, P: ?Sized> {
    /// Shared handles.
    ctx: SyncContext<'a, P>,
    /// Execution role of every function.
    role_arn: &'a str,
    /// Environment variables of every function.
    env: &'a BTreeMap<String, String>,
    /// Packaged code by function name.
    artifacts: &'a HashMap<String, PackagedArtifact>,
    /// Revision tag for created functions.
    revision: Option<&'a str>,
}

impl<'a, P: Provider + ?Sized> ComputeReconciler<'a, P> {
    /// Creates a compute reconciler.
    #[must_use]
    pub const fn new(
        ctx: SyncContext<'a, P>,
        role_arn: &'a str,
        env: &'a BTreeMap<String, String>,
        artifacts: &'a HashMap<String, PackagedArtifact>,
    ) -> Self {
        Self {
            ctx,
            role_arn,
            env,
            artifacts,
            revision: None,
        }
    }

    /// Tags created functions with a revision marker.
    #[must_use]
    pub const fn with_revision(mut self, revision: Option<&'a str>) -> Self {
        self.revision = revision;
        self
    }

    /// Brings the scope's functions to `declared`.
    ///
    /// Returns the functions that exist afterwards: the kept ones in provider
    /// order, then the created ones.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any phase; later phases do not run.
    pub async fn sync(
        &self,
        declared: &[DeclaredFunction],
        current: &[RemoteFunction],
    ) -> Result<Vec<DeployedFunction>> {
        let partition = DiffEngine::new().compare(declared, current);
        debug!(
            "Functions: {} missing, {} surplus, {} existing",
            partition.missing.len(),
            partition.surplus.len(),
            partition.existing.len()
        );

        let created = try_join_all(partition.missing.iter().map(|f| self.create(f))).await?;
        try_join_all(partition.surplus.iter().map(|f| self.delete(f))).await?;
        try_join_all(partition.existing.iter().map(|(d, c)| self.update(d, c))).await?;

        Ok(partition
            .existing
            .iter()
            .map(|(_, c)| DeployedFunction {
                name: c.name.clone(),
                id: c.id.clone(),
            })
            .chain(created)
            .collect())
    }

    fn artifact(&self, name: &str) -> Result<&'a PackagedArtifact> {
        self.artifacts.get(name).ok_or_else(|| {
            ConfigError::MissingArtifact {
                function: name.to_string(),
            }
            .into()
        })
    }

    fn configuration(&self, function: &DeclaredFunction) -> Result<FunctionConfiguration> {
        Ok(FunctionConfiguration {
            role: self.role_arn.to_string(),
            runtime: function.runtime()?.as_str().to_string(),
            handler: String::from(HANDLER),
            timeout: function.timeout(),
            memory_size: function.memory_size(),
            tracing_config: TracingConfig {
                mode: String::from("PassThrough"),
            },
            environment: EnvironmentVariables {
                variables: self.env.clone(),
            },
        })
    }

    async fn create(&self, function: &DeclaredFunction) -> Result<DeployedFunction> {
        let artifact = self.artifact(&function.name)?;
        let scope = self.ctx.scope;
        let mut tags = scope.tags();
        if let Some(revision) = self.revision {
            tags.insert(String::from("revision"), revision.to_string());
        }
        let request = CreateFunctionRequest {
            function_name: scope.function_name(&function.name),
            code: FunctionCode {
                zip_file: STANDARD.encode(&artifact.bytes),
            },
            package_type: String::from("Zip"),
            architectures: vec![function.architecture()?.as_str().to_string()],
            configuration: self.configuration(function)?,
            tags,
        };

        trace!("creating lambda {} ({})", function.name, artifact.size);
        let id = self.ctx.provider.create_function(&request).await?;
        debug!("Created lambda {} as {id}", function.name);
        self.ctx.report.record(ResourceKind::Function, Change::Created);
        Ok(DeployedFunction {
            name: function.name.clone(),
            id,
        })
    }

    async fn delete(&self, function: &RemoteFunction) -> Result<()> {
        trace!("deleting lambda {}", function.name);
        self.ctx
            .provider
            .delete_function(&self.ctx.scope.function_name(&function.name))
            .await?;
        debug!("Deleted lambda {}", function.name);
        self.ctx.report.record(ResourceKind::Function, Change::Deleted);
        Ok(())
    }

    async fn update(&self, function: &DeclaredFunction, remote: &RemoteFunction) -> Result<()> {
        let artifact = self.artifact(&function.name)?;
        let architectures = vec![function.architecture()?.as_str().to_string()];
        let configuration = self.configuration(function)?;
        let full_name = self.ctx.scope.function_name(&function.name);
        let mut changed = false;

        if architectures != remote.cpus || artifact.sha256 != remote.hash {
            trace!(
                "updating code for lambda {} ({} -> {})",
                function.name, remote.size, artifact.size
            );
            let request = UpdateCodeRequest {
                zip_file: STANDARD.encode(&artifact.bytes),
                architectures,
            };
            self.ctx
                .provider
                .update_function_code(&full_name, &request)
                .await?;
            debug!("Updated code for lambda {}", function.name);
            changed = true;
        }

        if configuration.environment.variables != remote.env
            || configuration.memory_size != remote.memory
            || configuration.timeout != remote.timeout
            || configuration.runtime != remote.runtime
        {
            trace!("updating config for lambda {}", function.name);
            self.ctx
                .provider
                .update_function_configuration(&full_name, &configuration)
                .await?;
            debug!("Updated config for lambda {}", function.name);
            changed = true;
        }

        let change = if changed {
            Change::Updated
        } else {
            Change::Unchanged
        };
        self.ctx.report.record(ResourceKind::Function, change);
        Ok(())
    }
}
