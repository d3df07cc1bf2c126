//! Sync orchestrator.
//!
//! Runs the per-kind reconcilers in dependency order: role, compute, role
//! policy, then triggers and gateway (in an order depending on whether the
//! gateway already existed), then topics and schedules.

use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{DeclaredFunction, GlueConfig, PackagedArtifact, Reflection, Scope};
use crate::error::{ReconcileError, Result};
use crate::planner::SyncReport;
use crate::provider::{CurrentState, Provider, StateReader, log_query_link, public_host};

use super::{
    ComputeReconciler, DeployedFunction, Location, ROLE_SETTLE_DELAY, RoleReconciler,
    RoutingReconciler, ScheduleReconciler, SyncContext, TopicReconciler, TriggerReconciler,
};

/// Result of one sync.
#[derive(Debug)]
pub struct SyncOutcome {
    /// Log-query console link for the declared functions.
    pub log_link: String,
    /// Public gateway URL, when HTTP functions are declared.
    pub host: Option<String>,
    /// What was changed.
    pub report: SyncReport,
}

/// Orchestrates a full sync of one scope.
#[derive(Debug)]
pub struct Reconciler<'a, P: ?Sized> {
    /// Resource provider.
    provider: &'a P,
    /// Scope being synced.
    scope: &'a Scope,
    /// Declared functions.
    reflection: &'a Reflection,
    /// Service settings.
    glue: &'a GlueConfig,
    /// Packaged code by function name.
    artifacts: &'a HashMap<String, PackagedArtifact>,
    /// Wait after creating the execution role.
    settle_delay: Duration,
}

impl<'a, P: Provider + ?Sized> Reconciler<'a, P> {
    /// Creates a new orchestrator.
    #[must_use]
    pub const fn new(
        provider: &'a P,
        scope: &'a Scope,
        reflection: &'a Reflection,
        glue: &'a GlueConfig,
        artifacts: &'a HashMap<String, PackagedArtifact>,
    ) -> Self {
        Self {
            provider,
            scope,
            reflection,
            glue,
            artifacts,
            settle_delay: ROLE_SETTLE_DELAY,
        }
    }

    /// Overrides the wait after role creation.
    #[must_use]
    pub const fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Reads the scope's current state and syncs it.
    ///
    /// # Errors
    ///
    /// Returns the first error of any stage; later stages do not run.
    pub async fn run(&self) -> Result<SyncOutcome> {
        let current = StateReader::new(self.provider).read(self.scope).await?;
        self.reconcile(&current).await
    }

    /// Brings the scope from `current` to the declared state.
    ///
    /// # Errors
    ///
    /// Returns the first error of any stage; later stages do not run.
    pub async fn reconcile(&self, current: &CurrentState) -> Result<SyncOutcome> {
        info!("Synchronizing {}", self.scope);
        let report = SyncReport::new();
        let ctx = SyncContext::new(self.provider, self.scope, &report);
        let declared = self.reflection.functions();

        let role = RoleReconciler::new(ctx).with_settle_delay(self.settle_delay);
        let role_arn = role.sync(current.role.as_ref()).await?;

        let deployed = ComputeReconciler::new(ctx, &role_arn, &self.glue.env, self.artifacts)
            .with_revision(self.reflection.revision.as_deref())
            .sync(&declared, &current.functions)
            .await?;
        let location = deployed
            .first()
            .and_then(|f| Location::from_arn(&f.id))
            .ok_or(ReconcileError::MissingRegionAccount)?;
        debug!("Deploying to {} in {}", location.account, location.region);

        let extra = self
            .glue
            .aws
            .as_ref()
            .map(|aws| aws.policy_statements.as_slice())
            .unwrap_or_default();
        role.assign_policy(&location, &self.glue.publish_topics, extra)
            .await?;

        let gateway_id = self
            .sync_gateway_and_triggers(ctx, current, &location, &declared, &deployed)
            .await?;

        TopicReconciler::new(ctx, &location)
            .sync(&declared, &deployed)
            .await?;
        ScheduleReconciler::new(ctx, &location)
            .sync(&declared)
            .await?;

        info!("Synchronized {}: {report}", self.scope);
        Ok(SyncOutcome {
            log_link: log_query_link(
                &location.region,
                self.scope,
                &self.reflection.function_names(),
                self.reflection.revision.as_deref(),
            ),
            host: gateway_id.map(|id| public_host(&id, &location.region)),
            report,
        })
    }

    /// Syncs triggers and the gateway, returning the gateway ID when HTTP
    /// functions are declared.
    ///
    /// With an existing gateway the triggers go first, against its known ID.
    /// Otherwise the gateway is created first so HTTP grants can name it.
    async fn sync_gateway_and_triggers(
        &self,
        ctx: SyncContext<'_, P>,
        current: &CurrentState,
        location: &Location,
        declared: &[DeclaredFunction],
        deployed: &[DeployedFunction],
    ) -> Result<Option<String>> {
        let http: Vec<DeclaredFunction> = declared
            .iter()
            .filter(|f| f.method().is_some())
            .cloned()
            .collect();
        let routing = RoutingReconciler::new(ctx, location, &self.glue.cors_sites);

        if let Some(api) = &current.gateway.api {
            debug!("Using gateway {}", api.api_id);
            TriggerReconciler::new(ctx, location, Some(&api.api_id))
                .sync(declared, deployed)
                .await?;
            if http.is_empty() {
                return Ok(None);
            }
            return routing.sync(&http, &current.gateway).await.map(Some);
        }

        let gateway_id = if http.is_empty() {
            None
        } else {
            Some(routing.sync(&http, &current.gateway).await?)
        };
        TriggerReconciler::new(ctx, location, gateway_id.as_deref())
            .sync(declared, deployed)
            .await?;
        Ok(gateway_id)
    }
}
