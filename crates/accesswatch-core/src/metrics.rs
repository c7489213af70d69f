//! Metrics aggregation over a snapshot of entries (C7).

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::model::Entry;

/// Hit count for one resource section, part of the ranked table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rank {
    pub section: String,
    pub hit_count: u64,
}

/// A point-in-time summary over every entry observed in one period.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub period_start: DateTime<FixedOffset>,
    pub period_end: DateTime<FixedOffset>,
    pub request_count: u64,
    pub error_count: u64,
    pub total_traffic: u64,
    pub unique_visitors: u64,
    pub avg_page_views: f32,
    pub rank: Vec<Rank>,
}

impl Metrics {
    /// Aggregates `entries` over `[period_start, period_end]`. `entries`
    /// need not already be restricted to that range; the range is recorded
    /// for display only, matching the caller's own windowing.
    pub fn from_entries(
        entries: &[Entry],
        period_start: DateTime<FixedOffset>,
        period_end: DateTime<FixedOffset>,
    ) -> Self {
        let mut total_traffic = 0u64;
        let mut error_count = 0u64;
        let mut visitors: HashMap<Vec<u8>, u64> = HashMap::with_capacity(entries.len());
        let mut hits: HashMap<String, u64> = HashMap::new();

        for e in entries {
            total_traffic += e.size() as u64;
            if e.status_code() >= 400 {
                error_count += 1;
            }
            *visitors.entry(e.ip().to_vec()).or_insert(0) += 1;

            if let Some(section) = extract_section(e.resource()) {
                *hits.entry(section).or_insert(0) += 1;
            }
        }

        let request_count = entries.len() as u64;
        let unique_visitors = visitors.len() as u64;
        let avg_page_views = request_count as f32 / unique_visitors as f32;

        let mut rank: Vec<Rank> = hits
            .into_iter()
            .map(|(section, hit_count)| Rank { section, hit_count })
            .collect();
        rank.sort_by(|a, b| b.hit_count.cmp(&a.hit_count));

        Self {
            period_start,
            period_end,
            request_count,
            error_count,
            total_traffic,
            unique_visitors,
            avg_page_views,
            rank,
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "\n[{} - {}] Requests: {} | Errors: {} | Traffic: {}",
            self.period_start.format("%d/%m/%Y:%H:%M:%S"),
            self.period_end.format("%d/%m/%Y:%H:%M:%S"),
            self.request_count,
            self.error_count,
            self.total_traffic,
        )?;

        if self.avg_page_views.is_nan() {
            writeln!(f, "Unique visitors: {}", self.unique_visitors)?;
        } else {
            writeln!(
                f,
                "Unique visitors: {} (Avg page views per visitor: {:.2})",
                self.unique_visitors, self.avg_page_views
            )?;
        }

        if self.rank.is_empty() {
            return Ok(());
        }

        writeln!(f, "{}", "\\".repeat(83))?;
        writeln!(f, "SECTION{}HITS", " ".repeat(73))?;
        writeln!(f, "{}", "-".repeat(84))?;
        for r in &self.rank {
            writeln!(f, "{}\t{}", r.section, r.hit_count)?;
        }
        writeln!(f, "{}", "/".repeat(80))
    }
}

/// Skips leading `/` bytes, then returns the slice up to the next `/`,
/// `#`, `?`, or end of input. `None` ("no section") if the resource is
/// entirely slashes, or empty once stripped.
pub fn extract_section(resource: &[u8]) -> Option<String> {
    let mut start = 0usize;
    while start < resource.len() && resource[start] == b'/' {
        start += 1;
    }
    if start == resource.len() {
        return None;
    }

    let mut end = start;
    while end < resource.len() {
        match resource[end] {
            b'/' | b'#' | b'?' => break,
            _ => end += 1,
        }
    }

    Some(String::from_utf8_lossy(&resource[start..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entry, Request};

    fn ts(secs: i64) -> DateTime<FixedOffset> {
        DateTime::from_timestamp(secs, 0).unwrap().fixed_offset()
    }

    fn entry(ip: &[u8], status: u32, size: u32, resource: &[u8]) -> Entry {
        let mut line = Vec::new();
        line.extend_from_slice(ip);
        line.extend_from_slice(resource);
        let ip_range = 0..ip.len() as u32;
        let resource_range = ip.len() as u32..line.len() as u32;
        Entry::from_parts(
            line.into_boxed_slice(),
            ip_range,
            0..0,
            0..0,
            ts(0),
            Request {
                method: 0..0,
                resource: resource_range,
                protocol: 0..0,
            },
            status,
            size,
        )
    }

    #[test]
    fn section_extraction_scenarios() {
        let cases: &[(&[u8], Option<&str>)] = &[
            (b"/twiki/bin/view", Some("twiki")),
            (b"/mailman/listinfo/hsdivision", Some("mailman")),
            (b"/1#subsection/2/3", Some("1")),
            (b"/twiki?test=data", Some("twiki")),
            (b"/twiki", Some("twiki")),
            (b"/twiki///", Some("twiki")),
            (b"///twiki", Some("twiki")),
            (b"////", None),
            (b"/", None),
        ];
        for (resource, expected) in cases {
            assert_eq!(
                extract_section(resource),
                expected.map(str::to_owned),
                "resource {:?}",
                std::str::from_utf8(resource)
            );
        }
    }

    #[test]
    fn section_ranking_counts_and_orders_by_hits() {
        let entries = [
            entry(b"1.1.1.1", 200, 1, b"/"),
            entry(b"1.1.1.1", 200, 1, b"/toto"),
            entry(b"1.1.1.1", 200, 1, b"/test"),
            entry(b"1.1.1.1", 200, 1, b"/toto#aa"),
            entry(b"1.1.1.1", 200, 1, b"/tata"),
            entry(b"1.1.1.1", 200, 1, b"/toto"),
            entry(b"1.1.1.1", 200, 1, b"/test"),
        ];
        let m = Metrics::from_entries(&entries, ts(0), ts(10));
        assert_eq!(
            m.rank,
            vec![
                Rank { section: "toto".into(), hit_count: 3 },
                Rank { section: "test".into(), hit_count: 2 },
                Rank { section: "tata".into(), hit_count: 1 },
            ]
        );
    }

    #[test]
    fn counts_errors_traffic_and_unique_visitors() {
        let entries = [
            entry(b"1.1.1.1", 200, 100, b"/a"),
            entry(b"1.1.1.1", 404, 50, b"/b"),
            entry(b"2.2.2.2", 500, 25, b"/c"),
        ];
        let m = Metrics::from_entries(&entries, ts(0), ts(10));
        assert_eq!(m.request_count, 3);
        assert_eq!(m.error_count, 2);
        assert_eq!(m.total_traffic, 175);
        assert_eq!(m.unique_visitors, 2);
        assert!((m.avg_page_views - 1.5).abs() < 1e-6);
    }

    #[test]
    fn avg_page_views_is_nan_with_no_entries() {
        let m = Metrics::from_entries(&[], ts(0), ts(10));
        assert!(m.avg_page_views.is_nan());
    }
}
