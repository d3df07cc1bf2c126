//! Mutation report for one sync.
//!
//! Every reconciler records what it did to each resource kind. The report is
//! shared by reference between concurrently running reconcilers.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Kinds of remote resources managed by the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Execution role.
    Role,
    /// Inline policy of the execution role.
    Policy,
    /// Compute unit.
    Function,
    /// HTTP gateway.
    Gateway,
    /// Gateway deployment stage.
    Stage,
    /// Gateway integration.
    Integration,
    /// Gateway route.
    Route,
    /// Permission grant.
    Grant,
    /// Schedule rule and its target.
    Schedule,
    /// Pub/sub topic.
    Topic,
    /// Topic subscription.
    Subscription,
}

/// What happened to one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Resource created.
    Created,
    /// Resource updated in place.
    Updated,
    /// Resource deleted.
    Deleted,
    /// Resource left as it was.
    Unchanged,
    /// Resource written by an unconditional idempotent put.
    Refreshed,
}

/// Per-kind counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    /// Created resources.
    pub created: usize,
    /// Updated resources.
    pub updated: usize,
    /// Deleted resources.
    pub deleted: usize,
    /// Unchanged resources.
    pub unchanged: usize,
    /// Resources rewritten by idempotent puts.
    pub refreshed: usize,
}

/// Aggregated report of one sync.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Counters by kind.
    kinds: Mutex<BTreeMap<ResourceKind, KindSummary>>,
}

impl SyncReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one change.
    pub fn record(&self, kind: ResourceKind, change: Change) {
        self.record_many(kind, change, 1);
    }

    /// Records `count` identical changes.
    pub fn record_many(&self, kind: ResourceKind, change: Change, count: usize) {
        if count == 0 {
            return;
        }
        let mut kinds = self.kinds.lock().unwrap_or_else(PoisonError::into_inner);
        let summary = kinds.entry(kind).or_default();
        match change {
            Change::Created => summary.created += count,
            Change::Updated => summary.updated += count,
            Change::Deleted => summary.deleted += count,
            Change::Unchanged => summary.unchanged += count,
            Change::Refreshed => summary.refreshed += count,
        }
    }

    /// Returns the counters of one kind.
    #[must_use]
    pub fn get(&self, kind: ResourceKind) -> KindSummary {
        self.snapshot().get(&kind).copied().unwrap_or_default()
    }

    /// Returns a copy of all counters, ordered by kind.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<ResourceKind, KindSummary> {
        self.kinds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Total number of mutating operations recorded.
    #[must_use]
    pub fn mutations(&self) -> usize {
        self.snapshot().values().map(KindSummary::mutations).sum()
    }

    /// Returns true if nothing was created, updated or deleted.
    ///
    /// Idempotent puts do not count.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.mutations() == 0
    }
}

impl KindSummary {
    /// Number of mutating operations.
    #[must_use]
    pub const fn mutations(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Role => "role",
            Self::Policy => "policy",
            Self::Function => "function",
            Self::Gateway => "gateway",
            Self::Stage => "stage",
            Self::Integration => "integration",
            Self::Route => "route",
            Self::Grant => "grant",
            Self::Schedule => "schedule",
            Self::Topic => "topic",
            Self::Subscription => "subscription",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        let total = |select: fn(&KindSummary) -> usize| snapshot.values().map(select).sum::<usize>();
        write!(
            f,
            "{} created, {} updated, {} deleted, {} unchanged, {} refreshed",
            total(|s| s.created),
            total(|s| s.updated),
            total(|s| s.deleted),
            total(|s| s.unchanged),
            total(|s| s.refreshed)
        )
    }
}
