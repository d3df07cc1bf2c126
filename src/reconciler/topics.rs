//! Topic and subscription reconciler.
//!
//! Topics are shared by every service of an environment; each event function
//! subscribes to the topic of its (topic, event type) pair. Both calls are
//! idempotent, and nothing is removed for functions that went away.

use futures::future::try_join_all;
use tracing::{debug, trace};

use crate::config::{DeclaredFunction, Trigger};
use crate::error::{ReconcileError, Result};
use crate::planner::{Change, ResourceKind};
use crate::provider::Provider;

use super::{DeployedFunction, Location, SyncContext, find_deployed};

/// Reconciler for topics and their subscriptions.
#[derive(Debug)]
pub struct TopicReconciler<'a, P: ?Sized> {
    /// Shared handles.
    ctx: SyncContext<'a, P>,
    /// Region and account of topic ARNs.
    location: &'a Location,
}

impl<'a, P: Provider + ?Sized> TopicReconciler<'a, P> {
    /// Creates a topic reconciler.
    #[must_use]
    pub const fn new(ctx: SyncContext<'a, P>, location: &'a Location) -> Self {
        Self { ctx, location }
    }

    /// Creates the topic of every event function and subscribes the function.
    ///
    /// # Errors
    ///
    /// Returns an error if an event function was not deployed or a provider
    /// call fails.
    pub async fn sync(
        &self,
        declared: &[DeclaredFunction],
        deployed: &[DeployedFunction],
    ) -> Result<()> {
        let events = declared.iter().filter_map(|f| match &f.trigger {
            Trigger::Event { topic, event_type } => Some((f, topic.as_str(), event_type.as_str())),
            _ => None,
        });
        try_join_all(
            events.map(|(f, topic, event_type)| self.subscribe(f, topic, event_type, deployed)),
        )
        .await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        function: &DeclaredFunction,
        topic: &str,
        event_type: &str,
        deployed: &[DeployedFunction],
    ) -> Result<()> {
        let target = find_deployed(deployed, &function.name).ok_or_else(|| {
            ReconcileError::MissingFunction {
                function: function.name.clone(),
            }
        })?;
        let scope = self.ctx.scope;
        let topic_name = scope.topic_name(topic, event_type);
        let tags = scope.tags();

        // Topics outlive any single service.
        let mut topic_tags = tags.clone();
        topic_tags.remove("service");
        trace!("creating {topic} topic for {event_type}");
        self.ctx.provider.create_topic(&topic_name, &topic_tags).await?;
        self.ctx.report.record(ResourceKind::Topic, Change::Refreshed);

        let topic_arn = format!(
            "arn:aws:sns:{}:{}:{topic_name}",
            self.location.region, self.location.account
        );
        trace!("subscribing to {topic} {event_type}");
        self.ctx
            .provider
            .subscribe(&topic_arn, &target.id, &tags)
            .await?;
        debug!("Subscribed {} to {topic_arn}", function.name);
        self.ctx
            .report
            .record(ResourceKind::Subscription, Change::Refreshed);
        Ok(())
    }
}
