//! Sliding-window alerter (C5).
//!
//! Operates in entry-driven virtual time: each tick ingests every queue
//! entry not yet processed, up to a virtual `end`, and reacts to the
//! running window size relative to a byte threshold.

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset};

use crate::model::Entry;
use crate::queue::EntryQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Recovered,
    Exceed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub timestamp: DateTime<FixedOffset>,
    pub total: i64,
    pub status: AlertStatus,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            AlertStatus::Exceed => write!(
                f,
                "High traffic generated an alert - hits = {}, triggered at {}",
                self.total,
                self.timestamp.format("%d/%m/%Y:%H:%M:%S")
            ),
            AlertStatus::Recovered => write!(
                f,
                "Traffic recovered at {}",
                self.timestamp.format("%d/%m/%Y:%H:%M:%S")
            ),
        }
    }
}

/// Tracks the window's running size and edge position against the shared
/// entry queue. `edge_pos`/`last_processed_pos` are `-1` when unset, mirroring
/// the reference implementation's nil-pointer sentinel with a plain index.
pub struct Window {
    edge_pos: isize,
    last_processed_pos: isize,
    size: i64,
    traffic_window: Duration,
    threshold: i64,
    status: AlertStatus,
    alerts: Vec<Alert>,
}

impl Window {
    pub fn new(traffic_window: Duration, threshold: i64) -> Self {
        Self {
            edge_pos: -1,
            last_processed_pos: -1,
            size: 0,
            traffic_window,
            threshold,
            status: AlertStatus::Recovered,
            alerts: Vec::new(),
        }
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn status(&self) -> AlertStatus {
        self.status
    }

    /// The alerter's current edge, as an index into the shared queue, for
    /// `EntryQueue::remove_outdated_entries` to protect from pruning.
    pub fn edge_pos(&self) -> Option<usize> {
        (self.edge_pos >= 0).then_some(self.edge_pos as usize)
    }

    /// Shifts positions after C3 has pruned `removed` entries from the
    /// front of the queue. Must be called before the next `ingest`.
    pub fn on_pruned(&mut self, removed: usize) {
        self.last_processed_pos -= removed as isize;
        self.edge_pos -= removed as isize;
    }

    fn next_to_process(&self, entries: &[Entry]) -> Option<usize> {
        let next = self.last_processed_pos + 1;
        (next >= 0 && (next as usize) < entries.len()).then_some(next as usize)
    }

    fn update_edge(&mut self, entries: &[Entry], ts: DateTime<FixedOffset>) {
        if entries.is_empty() {
            self.edge_pos = -1;
            self.size = 0;
            return;
        }

        let mut i = (self.edge_pos + 1).max(0) as usize;
        while i < entries.len() {
            if ts - entries[i].timestamp() >= self.traffic_window {
                self.size -= entries[i].size() as i64;
                self.edge_pos = i as isize;
                i += 1;
            } else {
                break;
            }
        }
    }

    fn process_status_exceed_for_entry(&mut self, entries: &[Entry], e_ts: DateTime<FixedOffset>) {
        self.update_edge(entries, e_ts);
        if self.edge_pos < 0 {
            return;
        }
        let edge_ts = entries[self.edge_pos as usize].timestamp();
        if e_ts - edge_ts >= self.traffic_window && self.size < self.threshold {
            self.status = AlertStatus::Recovered;
            self.alerts.push(Alert {
                timestamp: e_ts,
                total: self.size,
                status: self.status,
            });
        }
    }

    fn process_status_recovered_for_entry(
        &mut self,
        entries: &[Entry],
        e_ts: DateTime<FixedOffset>,
    ) {
        self.update_edge(entries, e_ts);
        if self.size > self.threshold {
            self.status = AlertStatus::Exceed;
            self.alerts.push(Alert {
                timestamp: e_ts,
                total: self.size,
                status: self.status,
            });
        }
    }

    /// Walks the window forward to virtual time `t` without a new entry
    /// arriving, detecting a recovery caused purely by time passing.
    fn process_status_exceed_for_time(&mut self, entries: &[Entry], t: DateTime<FixedOffset>) {
        let mut pos = (self.edge_pos + 1).max(0) as usize;
        if pos >= entries.len() {
            return;
        }
        if t - entries[pos].timestamp() < self.traffic_window {
            return;
        }

        while (pos as isize) <= self.last_processed_pos
            && t - entries[pos].timestamp() >= self.traffic_window
        {
            self.size -= entries[pos].size() as i64;
            self.edge_pos = pos as isize;
            pos += 1;

            if self.size <= self.threshold {
                let timestamp = entries[pos - 1].timestamp();
                while (pos as isize) <= self.last_processed_pos
                    && entries[pos].timestamp() == timestamp
                {
                    self.size -= entries[pos].size() as i64;
                    self.edge_pos = pos as isize;
                    pos += 1;
                }
                break;
            }
        }

        if self.size > self.threshold {
            return;
        }

        let edge_ts = entries[self.edge_pos as usize].timestamp();
        self.status = AlertStatus::Recovered;
        self.alerts.push(Alert {
            timestamp: edge_ts + self.traffic_window,
            total: self.size,
            status: self.status,
        });
    }

    /// Ingests every unprocessed entry with `ts <= end`, returning the
    /// alerts raised during this tick. Must be called after the queue has
    /// been pruned (via `on_pruned`) for this tick.
    pub fn ingest(&mut self, queue: &EntryQueue, end: DateTime<FixedOffset>) -> Vec<Alert> {
        self.alerts.clear();

        queue.read(|entries| {
            let mut cur = self.next_to_process(entries);

            while let Some(idx) = cur {
                if entries[idx].timestamp() > end {
                    break;
                }

                if self.status == AlertStatus::Exceed {
                    let previous_sec = entries[idx].timestamp() - Duration::seconds(1);
                    self.process_status_exceed_for_time(entries, previous_sec);
                }

                let e_ts = entries[idx].timestamp();
                self.size += entries[idx].size() as i64;
                self.last_processed_pos = idx as isize;

                while let Some(next) = self.next_to_process(entries) {
                    if entries[next].timestamp() != e_ts {
                        break;
                    }
                    self.size += entries[next].size() as i64;
                    self.last_processed_pos = next as isize;
                }

                match self.status {
                    AlertStatus::Recovered => {
                        self.process_status_recovered_for_entry(entries, e_ts)
                    }
                    AlertStatus::Exceed => self.process_status_exceed_for_entry(entries, e_ts),
                }

                cur = self.next_to_process(entries);
            }

            if self.status == AlertStatus::Exceed {
                let t = end - Duration::seconds(1);
                self.process_status_exceed_for_time(entries, t);
            }
        });

        std::mem::take(&mut self.alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entry, Request};
    use crate::pool::EntryPool;
    use std::sync::Arc;

    fn ts(secs: i64) -> DateTime<FixedOffset> {
        DateTime::from_timestamp(secs, 0).unwrap().fixed_offset()
    }

    fn entry_at(secs: i64, size: u32) -> Entry {
        Entry::from_parts(
            Box::new([]),
            0..0,
            0..0,
            0..0,
            ts(secs),
            Request {
                method: 0..0,
                resource: 0..0,
                protocol: 0..0,
            },
            200,
            size,
        )
    }

    #[test]
    fn alert_display_matches_reference_format() {
        let exceed = Alert {
            timestamp: ts(0),
            total: 500,
            status: AlertStatus::Exceed,
        };
        assert_eq!(
            exceed.to_string(),
            "High traffic generated an alert - hits = 500, triggered at 01/01/1970:00:00:00"
        );
        let recovered = Alert {
            timestamp: ts(0),
            total: 10,
            status: AlertStatus::Recovered,
        };
        assert_eq!(recovered.to_string(), "Traffic recovered at 01/01/1970:00:00:00");
    }

    #[test]
    fn basic_exceed_and_recover_scenario() {
        // threshold 100 bytes, 10s traffic window. Ten 50-byte hits inside
        // one second push the window over threshold; once the window has
        // fully slid past those hits the alerter recovers.
        let queue = EntryQueue::new(Arc::new(EntryPool::new(64)));
        for s in 0..10 {
            queue.add(entry_at(s, 50));
        }

        let mut window = Window::new(Duration::seconds(10), 100);
        let alerts = window.ingest(&queue, ts(9));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].status, AlertStatus::Exceed);
        assert_eq!(window.status(), AlertStatus::Exceed);

        // Advance far enough for the window to drain below threshold.
        let alerts = window.ingest(&queue, ts(30));
        assert!(alerts.iter().any(|a| a.status == AlertStatus::Recovered));
        assert_eq!(window.status(), AlertStatus::Recovered);
    }

    #[test]
    fn recovery_can_happen_purely_from_time_passing() {
        let queue = EntryQueue::new(Arc::new(EntryPool::new(64)));
        queue.add(entry_at(0, 200));

        let mut window = Window::new(Duration::seconds(10), 100);
        let alerts = window.ingest(&queue, ts(0));
        assert_eq!(alerts[0].status, AlertStatus::Exceed);

        // No new entries, but a later tick end lets the window empty by
        // the exceed-time check alone.
        let alerts = window.ingest(&queue, ts(15));
        assert!(alerts.iter().any(|a| a.status == AlertStatus::Recovered));
    }

    #[test]
    fn basic_exceed_and_recover_ticked_second_by_second() {
        // W = 5s, T = 400. Stepping the alerter one virtual second at a
        // time reproduces the reference's worked example exactly.
        let queue = EntryQueue::new(Arc::new(EntryPool::new(64)));
        for (s, size) in [
            (1, 1),
            (2, 540),
            (3, 1),
            (4, 1),
            (5, 1),
            (6, 1),
            (6, 1),
            (7, 1),
            (7, 5),
            (11, 390),
            (11, 10),
            (11, 2),
        ] {
            queue.add(entry_at(s, size));
        }

        let mut window = Window::new(Duration::seconds(5), 400);
        let mut all_alerts = Vec::new();
        for t in 1..=11 {
            all_alerts.extend(window.ingest(&queue, ts(t)));
        }

        assert_eq!(
            all_alerts
                .iter()
                .map(|a| (a.status, a.timestamp.timestamp(), a.total))
                .collect::<Vec<_>>(),
            vec![
                (AlertStatus::Exceed, 2, 541),
                (AlertStatus::Recovered, 7, 11),
                (AlertStatus::Exceed, 11, 408),
            ]
        );
    }

    #[test]
    fn time_only_recovery_between_sparse_entries() {
        // W = 2min, T = 400: a silent recovery detected purely by the
        // exceed-time check, with no entry arriving in between.
        let queue = EntryQueue::new(Arc::new(EntryPool::new(64)));
        for (s, size) in [(2, 391), (5, 10), (6, 1), (125, 15)] {
            queue.add(entry_at(s, size));
        }

        let mut window = Window::new(Duration::seconds(120), 400);
        let alerts = window.ingest(&queue, ts(125));

        assert_eq!(
            alerts
                .iter()
                .map(|a| (a.status, a.timestamp.timestamp(), a.total))
                .collect::<Vec<_>>(),
            vec![
                (AlertStatus::Exceed, 5, 401),
                (AlertStatus::Recovered, 122, 11),
            ]
        );
    }

    #[test]
    fn pruning_shifts_positions_without_breaking_invariants() {
        let pool = Arc::new(EntryPool::new(64));
        let queue = EntryQueue::new(pool);
        for s in 0..5 {
            queue.add(entry_at(s, 10));
        }
        let mut window = Window::new(Duration::seconds(100), 1000);
        window.ingest(&queue, ts(4));

        let removed = queue.remove_outdated_entries(window.edge_pos(), ts(-1), ts(-1));
        window.on_pruned(removed);
        assert!(window.last_processed_pos >= -1);
    }
}
