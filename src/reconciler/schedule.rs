//! Schedule reconciler.
//!
//! Writes one rule and one target per timer function. Both writes are
//! idempotent puts. Rules of removed timer functions are left in place.

use futures::future::try_join_all;
use tracing::{debug, trace};

use crate::config::{DeclaredFunction, Trigger};
use crate::error::{ConfigError, Result};
use crate::planner::{Change, ResourceKind};
use crate::provider::{Provider, PutRuleRequest, PutTargetsRequest, RuleTarget, tag_list};

use super::{Location, SyncContext};

/// Translates a 5-field cron schedule into the provider's 6-field form.
///
/// The first `*` of the day-of-week field becomes `?` and a year wildcard
/// is appended. Returns `None` unless the first five fields are present.
#[must_use]
pub fn cron_expression(schedule: &str) -> Option<String> {
    let mut fields = schedule.split(' ').filter(|f| !f.is_empty());
    let minute = fields.next()?;
    let hour = fields.next()?;
    let day_of_month = fields.next()?;
    let month = fields.next()?;
    let day_of_week = fields.next()?.replacen('*', "?", 1);
    Some(format!(
        "cron({minute} {hour} {day_of_month} {month} {day_of_week} *)"
    ))
}

/// Reconciler for timer schedules.
#[derive(Debug)]
pub struct ScheduleReconciler<'a, P: ?Sized> {
    /// Shared handles.
    ctx: SyncContext<'a, P>,
    /// Region and account of rule targets.
    location: &'a Location,
}

impl<'a, P: Provider + ?Sized> ScheduleReconciler<'a, P> {
    /// Creates a schedule reconciler.
    #[must_use]
    pub const fn new(ctx: SyncContext<'a, P>, location: &'a Location) -> Self {
        Self { ctx, location }
    }

    /// Writes the rule and target of every timer function.
    ///
    /// # Errors
    ///
    /// Returns an error if a schedule is malformed or a write fails.
    pub async fn sync(&self, declared: &[DeclaredFunction]) -> Result<()> {
        let timers = declared.iter().filter_map(|f| match &f.trigger {
            Trigger::Timer { schedule } => Some((f, schedule.as_str())),
            _ => None,
        });
        try_join_all(timers.map(|(f, schedule)| self.put_schedule(f, schedule))).await?;
        Ok(())
    }

    async fn put_schedule(&self, function: &DeclaredFunction, schedule: &str) -> Result<()> {
        let expression =
            cron_expression(schedule).ok_or_else(|| ConfigError::InvalidSchedule {
                function: function.name.clone(),
                schedule: schedule.to_string(),
            })?;
        let rule_name = self.ctx.scope.rule_name(&function.name);

        trace!("creating event bridge rule {} for {schedule}", function.name);
        let rule_arn = self
            .ctx
            .provider
            .put_rule(&PutRuleRequest {
                name: rule_name.clone(),
                schedule_expression: expression,
                tags: tag_list(&self.ctx.scope.tags()),
            })
            .await?;
        debug!("Rule {rule_arn} written");

        trace!("creating event bridge target {}", function.name);
        self.ctx
            .provider
            .put_targets(&PutTargetsRequest {
                rule: rule_name.clone(),
                targets: vec![RuleTarget {
                    id: rule_name.clone(),
                    arn: self.location.function_arn(&rule_name),
                }],
            })
            .await?;
        self.ctx
            .report
            .record(ResourceKind::Schedule, Change::Refreshed);
        Ok(())
    }
}
