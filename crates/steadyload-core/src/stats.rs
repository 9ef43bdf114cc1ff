use serde::{Deserialize, Serialize};

use crate::invoker::{AttemptResult, AttemptStatus};

/// Histogram bucket edges in seconds. Each bucket is `[lo, hi)`; the last one
/// is open-ended.
pub const LATENCY_EDGES: [f64; 10] = [0.0, 0.1, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 5.0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyBucket {
    pub lo: f64,
    /// `None` for the open-ended top bucket
    pub hi: Option<f64>,
    pub count: u64,
}

impl LatencyBucket {
    pub fn label(&self) -> String {
        match self.hi {
            Some(hi) => format!("{}-{}s", self.lo, hi),
            None => format!("{}-{}+s", self.lo, self.lo),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Count {
    pub key: String,
    pub count: u64,
}

/// Aggregate view of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total: u64,
    pub errors: u64,
    pub duration_ms: u64,
    pub achieved_rps: f64,
    pub latency_avg_secs: f64,
    pub latency_min_secs: f64,
    pub latency_max_secs: f64,
    pub latency_p50_secs: f64,
    pub latency_p95_secs: f64,
    pub latency_p99_secs: f64,
    /// Requests per method, in first-seen order
    pub methods: Vec<Count>,
    /// Requests per status, in first-seen order
    pub statuses: Vec<Count>,
    pub buckets: Vec<LatencyBucket>,
}

fn bump(counts: &mut Vec<Count>, key: String) {
    match counts.iter_mut().find(|c| c.key == key) {
        Some(c) => c.count += 1,
        None => counts.push(Count { key, count: 1 }),
    }
}

fn bucket_index(latency: f64) -> usize {
    LATENCY_EDGES
        .iter()
        .rposition(|&lo| latency >= lo)
        .unwrap_or(0)
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[f64], p: u64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((sorted.len() as u64 * p).div_ceil(100)).max(1) as usize;
    sorted[rank.min(sorted.len()) - 1]
}

impl StatsSummary {
    pub fn from_results<'a, I>(results: I, duration_ms: u64) -> Self
    where
        I: IntoIterator<Item = &'a AttemptResult>,
    {
        let mut latencies = Vec::new();
        let mut methods = Vec::new();
        let mut statuses = Vec::new();
        let mut errors = 0u64;
        let mut bucket_counts = [0u64; LATENCY_EDGES.len()];

        for result in results {
            latencies.push(result.latency_secs);
            bump(&mut methods, result.method.to_string());
            bump(&mut statuses, result.status.to_string());
            if result.status == AttemptStatus::Error {
                errors += 1;
            }
            bucket_counts[bucket_index(result.latency_secs)] += 1;
        }

        let total = latencies.len() as u64;
        latencies.sort_by(|a, b| a.total_cmp(b));
        let sum: f64 = latencies.iter().sum();

        let buckets = LATENCY_EDGES
            .iter()
            .enumerate()
            .map(|(i, &lo)| LatencyBucket {
                lo,
                hi: LATENCY_EDGES.get(i + 1).copied(),
                count: bucket_counts[i],
            })
            .collect();

        let achieved_rps = if duration_ms > 0 {
            total as f64 * 1000.0 / duration_ms as f64
        } else {
            0.0
        };

        Self {
            total,
            errors,
            duration_ms,
            achieved_rps,
            latency_avg_secs: if total > 0 { sum / total as f64 } else { 0.0 },
            latency_min_secs: latencies.first().copied().unwrap_or(0.0),
            latency_max_secs: latencies.last().copied().unwrap_or(0.0),
            latency_p50_secs: percentile(&latencies, 50),
            latency_p95_secs: percentile(&latencies, 95),
            latency_p99_secs: percentile(&latencies, 99),
            methods,
            statuses,
            buckets,
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.errors as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpMethod;

    fn result(index: u64, status: AttemptStatus, latency_secs: f64) -> AttemptResult {
        AttemptResult {
            index,
            url: "http://a".into(),
            method: HttpMethod::Get,
            status,
            latency_secs,
            request: String::new(),
            request_body: String::new(),
            response: String::new(),
            extracted: Vec::new(),
        }
    }

    #[test]
    fn test_summary_basic() {
        let results = vec![
            result(0, AttemptStatus::Http(200), 0.05),
            result(1, AttemptStatus::Http(500), 0.3),
            result(2, AttemptStatus::Error, 1.2),
            result(3, AttemptStatus::Http(200), 7.0),
        ];
        let summary = StatsSummary::from_results(&results, 2000);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.latency_min_secs, 0.05);
        assert_eq!(summary.latency_max_secs, 7.0);
        assert!((summary.latency_avg_secs - 2.1375).abs() < 1e-9);
        assert_eq!(summary.achieved_rps, 2.0);
        assert_eq!(summary.error_rate(), 0.25);

        let statuses: Vec<(&str, u64)> = summary
            .statuses
            .iter()
            .map(|c| (c.key.as_str(), c.count))
            .collect();
        assert_eq!(statuses, vec![("200", 2), ("500", 1), ("Error", 1)]);
        assert_eq!(summary.methods[0].key, "GET");
        assert_eq!(summary.methods[0].count, 4);
    }

    #[test]
    fn test_bucket_edges() {
        let results = vec![
            result(0, AttemptStatus::Http(200), 0.0),
            result(1, AttemptStatus::Http(200), 0.1),
            result(2, AttemptStatus::Http(200), 0.2499),
            result(3, AttemptStatus::Http(200), 5.0),
            result(4, AttemptStatus::Http(200), 60.0),
        ];
        let summary = StatsSummary::from_results(&results, 0);
        let counts: Vec<u64> = summary.buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 2, 0, 0, 0, 0, 0, 0, 0, 2]);
        assert_eq!(summary.buckets[0].label(), "0-0.1s");
        assert_eq!(summary.buckets[9].label(), "5-5+s");
        assert_eq!(summary.buckets[9].hi, None);
    }

    #[test]
    fn test_percentiles() {
        let results: Vec<AttemptResult> = (1..=100)
            .map(|i| result(i, AttemptStatus::Http(200), i as f64 / 100.0))
            .collect();
        let summary = StatsSummary::from_results(&results, 1000);
        assert_eq!(summary.latency_p50_secs, 0.5);
        assert_eq!(summary.latency_p95_secs, 0.95);
        assert_eq!(summary.latency_p99_secs, 0.99);
    }

    #[test]
    fn test_empty_results() {
        let results: Vec<AttemptResult> = Vec::new();
        let summary = StatsSummary::from_results(&results, 0);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.latency_avg_secs, 0.0);
        assert_eq!(summary.latency_min_secs, 0.0);
        assert_eq!(summary.error_rate(), 0.0);
        assert!(summary.buckets.iter().all(|b| b.count == 0));
    }
}
