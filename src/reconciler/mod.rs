//! Reconciliation engine.
//!
//! One reconciler per resource kind brings that kind to the declared state;
//! the [`Reconciler`] sequences them in dependency order.

mod compute;
mod orchestrator;
mod role;
mod routing;
mod schedule;
mod topics;
mod triggers;

#[cfg(test)]
mod scenarios;

use crate::config::Scope;
use crate::planner::{Named, SyncReport};

pub use compute::{ComputeReconciler, DeployedFunction};
pub use orchestrator::{Reconciler, SyncOutcome};
pub use role::{ROLE_SETTLE_DELAY, RoleReconciler, policy_document};
pub use routing::{RoutingReconciler, cors_settings, integration_spec, route_spec};
pub use schedule::{ScheduleReconciler, cron_expression};
pub use topics::TopicReconciler;
pub use triggers::{TriggerReconciler, expected_grant, normalize_path};

/// Region and account every ARN of one sync is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Region.
    pub region: String,
    /// Account ID.
    pub account: String,
}

impl Location {
    /// Extracts region and account from an ARN
    /// (`arn:partition:service:region:account:...`).
    #[must_use]
    pub fn from_arn(arn: &str) -> Option<Self> {
        let mut parts = arn.split(':').skip(3);
        let region = parts.next().filter(|r| !r.is_empty())?;
        let account = parts.next().filter(|a| !a.is_empty())?;
        Some(Self {
            region: region.to_string(),
            account: account.to_string(),
        })
    }

    /// ARN of a function by full name.
    #[must_use]
    pub fn function_arn(&self, function_name: &str) -> String {
        format!(
            "arn:aws:lambda:{}:{}:function:{function_name}",
            self.region, self.account
        )
    }
}

/// Handles shared by every reconciler of one sync.
#[derive(Debug)]
pub struct SyncContext<'a, P: ?Sized> {
    /// Resource provider.
    pub provider: &'a P,
    /// Scope being synced.
    pub scope: &'a Scope,
    /// Mutation report.
    pub report: &'a SyncReport,
}

impl<P: ?Sized> Clone for SyncContext<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: ?Sized> Copy for SyncContext<'_, P> {}

impl<'a, P: ?Sized> SyncContext<'a, P> {
    /// Bundles the shared handles.
    #[must_use]
    pub const fn new(provider: &'a P, scope: &'a Scope, report: &'a SyncReport) -> Self {
        Self {
            provider,
            scope,
            report,
        }
    }
}

/// Finds the deployed function named `name`.
fn find_deployed<'f>(functions: &'f [DeployedFunction], name: &str) -> Option<&'f DeployedFunction> {
    functions.iter().find(|f| f.name() == name)
}
