//! Invoke-permission reconciler.
//!
//! Every declared function carries exactly one grant allowing its trigger
//! source to invoke it. Attached statements are compared verbatim against
//! the expected one; everything but the first exact match is removed.

use futures::future::try_join_all;
use std::fmt::Write;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::{DeclaredFunction, Scope, Trigger};
use crate::error::{ReconcileError, Result};
use crate::provider::{
    AddPermissionRequest, Grant, GrantCondition, GrantSpec, Principal, Provider, SourceArn,
};
use crate::planner::{Change, ResourceKind};

use super::{DeployedFunction, Location, SyncContext, find_deployed};

/// Action every grant allows.
const INVOKE_ACTION: &str = "lambda:InvokeFunction";

/// Replaces each `*` with a positional `{pN}` placeholder and drops one
/// trailing slash.
#[must_use]
pub fn normalize_path(path_pattern: &str) -> String {
    let trimmed = path_pattern.strip_suffix('/').unwrap_or(path_pattern);
    let mut out = String::with_capacity(trimmed.len() + 8);
    let mut position = 0;
    for ch in trimmed.chars() {
        if ch == '*' {
            position += 1;
            let _ = write!(out, "{{p{position}}}");
        } else {
            out.push(ch);
        }
    }
    out
}

/// The grant a function's trigger needs, as the provider reports it.
///
/// # Errors
///
/// Returns [`ReconcileError::MissingGateway`] for an HTTP function when no
/// gateway ID is known.
pub fn expected_grant(
    function: &DeclaredFunction,
    location: &Location,
    scope: &Scope,
    function_arn: &str,
    api_id: Option<&str>,
) -> Result<GrantSpec> {
    let Location { region, account } = location;
    let (service, source_arn) = match &function.trigger {
        Trigger::Http { path_pattern, .. } => {
            let api_id = api_id.ok_or_else(|| ReconcileError::MissingGateway {
                function: function.name.clone(),
            })?;
            (
                "apigateway.amazonaws.com",
                format!(
                    "arn:aws:execute-api:{region}:{account}:{api_id}/*/*/{}",
                    normalize_path(path_pattern)
                ),
            )
        }
        Trigger::Timer { .. } => (
            "events.amazonaws.com",
            format!(
                "arn:aws:events:{region}:{account}:rule/{}",
                scope.rule_name(&function.name)
            ),
        ),
        Trigger::Event { topic, event_type } => (
            "sns.amazonaws.com",
            format!(
                "arn:aws:sns:{region}:{account}:{}",
                scope.topic_name(topic, event_type)
            ),
        ),
    };

    Ok(GrantSpec {
        action: String::from(INVOKE_ACTION),
        effect: String::from("Allow"),
        principal: Principal {
            service: String::from(service),
        },
        resource: function_arn.to_string(),
        condition: GrantCondition {
            arn_like: SourceArn { source_arn },
        },
    })
}

/// Reconciler for invoke permissions.
#[derive(Debug)]
pub struct TriggerReconciler<'a, P: ?Sized> {
    /// Shared handles.
    ctx: SyncContext<'a, P>,
    /// Region and account of source ARNs.
    location: &'a Location,
    /// Gateway of HTTP functions, if any.
    api_id: Option<&'a str>,
}

impl<'a, P: Provider + ?Sized> TriggerReconciler<'a, P> {
    /// Creates a trigger reconciler.
    #[must_use]
    pub const fn new(
        ctx: SyncContext<'a, P>,
        location: &'a Location,
        api_id: Option<&'a str>,
    ) -> Self {
        Self {
            ctx,
            location,
            api_id,
        }
    }

    /// Ensures every declared function carries exactly its expected grant.
    ///
    /// # Errors
    ///
    /// Returns an error if a function was not deployed, an HTTP function has
    /// no gateway, or a provider call fails.
    pub async fn sync(
        &self,
        declared: &[DeclaredFunction],
        deployed: &[DeployedFunction],
    ) -> Result<()> {
        try_join_all(declared.iter().map(|f| self.sync_function(f, deployed))).await?;
        Ok(())
    }

    async fn sync_function(
        &self,
        function: &DeclaredFunction,
        deployed: &[DeployedFunction],
    ) -> Result<()> {
        let target = find_deployed(deployed, &function.name).ok_or_else(|| {
            ReconcileError::MissingFunction {
                function: function.name.clone(),
            }
        })?;
        let expected = expected_grant(
            function,
            self.location,
            self.ctx.scope,
            &target.id,
            self.api_id,
        )?;
        let full_name = self.ctx.scope.function_name(&function.name);
        let current = self.ctx.provider.list_grants(&full_name).await?;
        self.sync_grants(&function.name, &full_name, &expected, &current)
            .await
    }

    async fn sync_grants(
        &self,
        name: &str,
        full_name: &str,
        expected: &GrantSpec,
        current: &[Grant],
    ) -> Result<()> {
        let mut kept = false;
        for grant in current {
            if !kept && grant.matches(expected) {
                kept = true;
                continue;
            }
            trace!("deleting trigger {} from {name}", grant.sid);
            self.ctx.provider.remove_grant(full_name, &grant.sid).await?;
            self.ctx.report.record(ResourceKind::Grant, Change::Deleted);
        }

        if kept {
            self.ctx.report.record(ResourceKind::Grant, Change::Unchanged);
            return Ok(());
        }

        let request = AddPermissionRequest {
            statement_id: Uuid::new_v4().to_string(),
            action: expected.action.clone(),
            principal: expected.principal.service.clone(),
            source_arn: expected.source_arn().to_string(),
        };
        trace!("adding trigger {} to lambda {name}", request.statement_id);
        trace!("  from {}", request.source_arn);
        self.ctx.provider.add_grant(full_name, &request).await?;
        debug!("Granted {} on {name}", request.principal);
        self.ctx.report.record(ResourceKind::Grant, Change::Created);
        Ok(())
    }
}
