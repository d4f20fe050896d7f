//! Tracked-instrument set shared by the collector and the selection scheduler

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

/// Instruments gained and lost by a replacement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl TrackingDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Current tracked set; replaced wholesale, read continuously
#[derive(Debug, Default)]
pub struct TrackedSet {
    inner: RwLock<BTreeSet<String>>,
}

impl TrackedSet {
    pub fn new(initial: impl IntoIterator<Item = String>) -> Self {
        Self {
            inner: RwLock::new(initial.into_iter().collect()),
        }
    }

    pub fn snapshot(&self) -> BTreeSet<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn instruments(&self) -> Vec<String> {
        self.snapshot().into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap in `next` and report what changed
    pub fn replace(&self, next: BTreeSet<String>) -> TrackingDiff {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let diff = TrackingDiff {
            added: next.difference(&guard).cloned().collect(),
            removed: guard.difference(&next).cloned().collect(),
        };
        *guard = next;
        diff
    }
}
