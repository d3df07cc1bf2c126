//! Diff engine for comparing declared against current resources.
//!
//! Resources of any kind are matched by name. The comparison is a pure
//! function over two slices; it never talks to the provider.

use std::collections::HashMap;
use tracing::trace;

use crate::config::DeclaredFunction;

/// A resource with a name that identifies it within its kind.
pub trait Named {
    /// The identity key.
    fn name(&self) -> &str;
}

/// Engine for partitioning declared and current resources.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

/// Result of one comparison.
#[derive(Debug)]
pub struct Partition<'a, T, S> {
    /// Declared entries without any current entry of the same name.
    pub missing: Vec<&'a T>,
    /// Current entries to delete: unmatched ones, then later duplicates.
    pub surplus: Vec<&'a S>,
    /// Current entries kept, each paired with its declared entry.
    pub existing: Vec<(&'a T, &'a S)>,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Partitions `current` against `declared`.
    ///
    /// Every current entry lands in exactly one of `surplus` or `existing`.
    /// When several current entries share a declared name, the first one in
    /// provider order is kept and the rest are surplus.
    #[must_use]
    pub fn compare<'a, T: Named, S: Named>(
        &self,
        declared: &'a [T],
        current: &'a [S],
    ) -> Partition<'a, T, S> {
        let mut declared_ix: HashMap<&str, usize> = HashMap::with_capacity(declared.len());
        for (ix, d) in declared.iter().enumerate() {
            declared_ix.entry(d.name()).or_insert(ix);
        }

        // Index of the surviving current entry for each declared name.
        let mut kept: HashMap<&str, usize> = HashMap::with_capacity(current.len());
        let mut unmatched = Vec::new();
        let mut duplicates = Vec::new();
        let mut existing = Vec::new();

        for (ix, c) in current.iter().enumerate() {
            let Some(&dix) = declared_ix.get(c.name()) else {
                unmatched.push(ix);
                continue;
            };
            if kept.contains_key(c.name()) {
                trace!("duplicate current entry {} at #{ix}", c.name());
                duplicates.push(ix);
            } else {
                kept.insert(c.name(), ix);
                existing.push((&declared[dix], c));
            }
        }

        let missing = declared
            .iter()
            .filter(|d| !kept.contains_key(d.name()))
            .collect();
        let surplus = unmatched
            .into_iter()
            .chain(duplicates)
            .map(|ix| &current[ix])
            .collect();

        Partition {
            missing,
            surplus,
            existing,
        }
    }
}

impl Named for String {
    fn name(&self) -> &str {
        self
    }
}

impl Named for &str {
    fn name(&self) -> &str {
        self
    }
}

impl Named for DeclaredFunction {
    fn name(&self) -> &str {
        &self.name
    }
}
