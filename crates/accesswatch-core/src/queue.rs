//! Time-ordered entry queue with window queries and pruning (C3).

use std::sync::{Arc, RwLock};

use chrono::{DateTime, FixedOffset};

use crate::model::Entry;
use crate::pool::EntryPool;

/// Entries ordered ascending by timestamp, shared between the reading
/// pipeline (writer), the metrics aggregator (reader), and the alerter
/// (reader, via position-indexed access).
pub struct EntryQueue {
    entries: RwLock<Vec<Entry>>,
    pool: Arc<EntryPool>,
}

impl EntryQueue {
    pub fn new(pool: Arc<EntryPool>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            pool,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("entry queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a single entry.
    pub fn add(&self, entry: Entry) {
        self.entries
            .write()
            .expect("entry queue lock poisoned")
            .push(entry);
    }

    /// Appends a batch already sorted by the caller. Does not re-sort;
    /// C4 sorts its local batch before calling this so the append keeps
    /// the queue's ascending-timestamp invariant.
    pub fn add_sorted_batch(&self, mut batch: Vec<Entry>) {
        if batch.is_empty() {
            return;
        }
        self.entries
            .write()
            .expect("entry queue lock poisoned")
            .append(&mut batch);
    }

    /// Runs `f` against the current entries under the reader lock. Used by
    /// the alerter, which needs several successive index-based lookups
    /// against a single consistent view.
    pub fn read<R>(&self, f: impl FnOnce(&[Entry]) -> R) -> R {
        let entries = self.entries.read().expect("entry queue lock poisoned");
        f(&entries)
    }

    /// Returns a snapshot of every entry with `start <= ts <= end`, found by
    /// scanning in from both ends. May be empty.
    pub fn entries_in_window(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Vec<Entry> {
        let entries = self.entries.read().expect("entry queue lock poisoned");

        let mut i = 0usize;
        while i < entries.len() && start > entries[i].timestamp() {
            i += 1;
        }
        if i == entries.len() {
            return Vec::new();
        }

        let mut j = entries.len() - 1;
        while j >= i && entries[j].timestamp() > end {
            if j == 0 {
                return Vec::new();
            }
            j -= 1;
        }
        if j < i {
            return Vec::new();
        }

        entries[i..=j].to_vec()
    }

    /// Removes every entry strictly before `min(start_metrics,
    /// start_traffic_window)` from the front of the queue, stopping at the
    /// first entry that is either within range or sits at `edge_pos` (the
    /// alerter's edge is never evicted). Removed entries are recycled.
    /// Returns the number removed.
    ///
    /// Prunes nothing while `edge_pos` is `None`: the alerter hasn't
    /// advanced its edge yet, so there is no "outside the window" entry to
    /// anchor on, and pruning anyway would shift positions out from under
    /// an edge the caller is about to set from this same unpruned slice.
    pub fn remove_outdated_entries(
        &self,
        edge_pos: Option<usize>,
        start_metrics: DateTime<FixedOffset>,
        start_traffic_window: DateTime<FixedOffset>,
    ) -> usize {
        let Some(edge_pos) = edge_pos else {
            return 0;
        };
        let min = start_metrics.min(start_traffic_window);

        let mut entries = self.entries.write().expect("entry queue lock poisoned");

        let mut cut = 0usize;
        for (i, e) in entries.iter().enumerate() {
            if i != edge_pos && e.timestamp() < min {
                cut += 1;
            } else {
                break;
            }
        }

        for removed in entries.drain(0..cut) {
            self.pool.recycle(removed);
        }

        cut
    }
}
