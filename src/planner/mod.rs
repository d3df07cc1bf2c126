//! Planning module for sync operations.
//!
//! This module handles the comparison between declared and current
//! resources, and the accounting of the mutations applied.

mod diff;
mod report;

pub use diff::{DiffEngine, Named, Partition};
pub use report::{Change, KindSummary, ResourceKind, SyncReport};
