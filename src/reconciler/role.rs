//! Execution role and its inline policy.
//!
//! The role is created at most once per scope and never deleted. Its inline
//! policy is overwritten on every sync.

use std::time::Duration;
use tracing::{debug, info};

use crate::config::{PolicyStatement, Scope};
use crate::error::Result;
use crate::planner::{Change, ResourceKind};
use crate::provider::{OneOrMany, PolicyDocument, PolicyDocumentStatement, Provider, Role};

use super::{Location, SyncContext};

/// Time a new role needs before the compute service accepts it.
pub const ROLE_SETTLE_DELAY: Duration = Duration::from_secs(10);

/// Policy language version.
const POLICY_VERSION: &str = "2012-10-17";

/// Table and accelerator actions granted on the scope's tables.
const TABLE_ACTIONS: &[&str] = &[
    "dynamodb:CreateTable",
    "dynamodb:BatchGetItem",
    "dynamodb:ConditionCheckItem",
    "dynamodb:PutItem",
    "dynamodb:DeleteItem",
    "dynamodb:GetItem",
    "dynamodb:Scan",
    "dynamodb:Query",
    "dynamodb:UpdateItem",
    "dynamodb:UpdateTable",
    "dynamodb:GetRecords",
    "dax:GetItem",
    "dax:PutItem",
    "dax:ConditionCheckItem",
    "dax:BatchGetItem",
    "dax:BatchWriteItem",
    "dax:DeleteItem",
    "dax:Query",
    "dax:UpdateItem",
    "dax:Scan",
];

/// Reconciler for the execution role.
#[derive(Debug)]
pub struct RoleReconciler<'a, P: ?Sized> {
    /// Shared handles.
    ctx: SyncContext<'a, P>,
    /// Wait after creating the role.
    settle_delay: Duration,
}

impl<'a, P: Provider + ?Sized> RoleReconciler<'a, P> {
    /// Creates a role reconciler.
    #[must_use]
    pub const fn new(ctx: SyncContext<'a, P>) -> Self {
        Self {
            ctx,
            settle_delay: ROLE_SETTLE_DELAY,
        }
    }

    /// Overrides the wait after role creation.
    #[must_use]
    pub const fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Returns the ARN of the scope's role, creating the role if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the role cannot be created.
    pub async fn sync(&self, current: Option<&Role>) -> Result<String> {
        if let Some(role) = current {
            debug!("Using role {}", role.arn);
            self.ctx.report.record(ResourceKind::Role, Change::Unchanged);
            return Ok(role.arn.clone());
        }

        let role_name = self.ctx.scope.role_name();
        info!("creating role {role_name}");
        let role = self
            .ctx
            .provider
            .create_role(&role_name, &self.ctx.scope.tags())
            .await?;
        self.ctx.report.record(ResourceKind::Role, Change::Created);
        debug!("Created role {}, settling for {:?}", role.arn, self.settle_delay);
        tokio::time::sleep(self.settle_delay).await;
        Ok(role.arn)
    }

    /// Overwrites the role's inline policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy cannot be written.
    pub async fn assign_policy(
        &self,
        location: &Location,
        publish_topics: &[String],
        extra: &[PolicyStatement],
    ) -> Result<()> {
        let scope = self.ctx.scope;
        let document = policy_document(scope, location, publish_topics, extra);
        info!("assigning policy");
        self.ctx
            .provider
            .put_role_policy(&scope.role_name(), &scope.policy_name(), &document)
            .await?;
        self.ctx.report.record(ResourceKind::Policy, Change::Refreshed);
        debug!("Assigned {} policy statements", document.statement.len());
        Ok(())
    }
}

/// Builds the full inline policy of a scope's role: log access, the scope's
/// tables, publishing to declared topics, then caller-supplied statements
/// with `$REGION` and `$ACCOUNT` substituted.
#[must_use]
pub fn policy_document(
    scope: &Scope,
    location: &Location,
    publish_topics: &[String],
    extra: &[PolicyStatement],
) -> PolicyDocument {
    let Location { region, account } = location;
    let many = |actions: &[&str]| OneOrMany::Many(actions.iter().map(|a| (*a).to_string()).collect());
    let allow = |resource: String, action: OneOrMany| PolicyDocumentStatement {
        effect: String::from("Allow"),
        resource,
        action,
    };

    let mut statement = vec![
        allow(
            format!("arn:aws:logs:{region}:{account}:*"),
            OneOrMany::One(String::from("logs:CreateLogGroup")),
        ),
        allow(
            format!(
                "arn:aws:logs:{region}:{account}:log-group:/aws/lambda/{}-*",
                scope.prefix()
            ),
            many(&["logs:CreateLogStream", "logs:PutLogEvents"]),
        ),
        allow(
            format!(
                "arn:aws:dynamodb:{region}:{account}:table/{}.{}.*",
                scope.environment, scope.service
            ),
            many(TABLE_ACTIONS),
        ),
    ];
    statement.extend(publish_topics.iter().map(|topic| {
        allow(
            format!("arn:aws:sns:{region}:{account}:{}-{topic}-*", scope.environment),
            many(&["sns:Publish"]),
        )
    }));
    statement.extend(extra.iter().map(|s| PolicyDocumentStatement {
        effect: s.effect.clone(),
        resource: s
            .resource
            .replace("$REGION", region)
            .replace("$ACCOUNT", account),
        action: OneOrMany::Many(s.action.clone()),
    }));

    PolicyDocument {
        version: String::from(POLICY_VERSION),
        statement,
    }
}
