use serde_json::Value;
use std::fmt::Write as _;
use std::io::{self, Write};

use crate::invoker::AttemptResult;
use crate::stats::StatsSummary;

pub const BASE_COLUMNS: [&str; 7] = [
    "url",
    "method",
    "status",
    "latency",
    "request",
    "request_body",
    "response",
];

const CHART_WIDTH: usize = 50;

fn extracted_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Write results as CSV: the fixed columns, then one column per JSON path.
/// Records are terminated with `\r\n`.
pub fn write_csv<'a, W, I>(out: &mut W, json_paths: &[String], results: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a AttemptResult>,
{
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(out);

    let header: Vec<&str> = BASE_COLUMNS
        .iter()
        .copied()
        .chain(json_paths.iter().map(String::as_str))
        .collect();
    wtr.write_record(&header)?;

    for result in results {
        let mut row = vec![
            result.url.clone(),
            result.method.as_str().to_string(),
            result.status.to_string(),
            result.latency_secs.to_string(),
            result.request.clone(),
            result.request_body.clone(),
            result.response.clone(),
        ];
        for path in json_paths {
            let value = result
                .extracted
                .iter()
                .find(|e| &e.path == path)
                .and_then(|e| e.value.as_ref());
            row.push(extracted_cell(value));
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()
}

/// Horizontal bar chart of the non-empty latency buckets.
pub fn render_histogram(summary: &StatsSummary) -> String {
    let rows: Vec<(String, u64)> = summary
        .buckets
        .iter()
        .filter(|b| b.count > 0)
        .map(|b| (b.label(), b.count))
        .collect();
    let max = rows.iter().map(|(_, c)| *c).max().unwrap_or(0);
    let label_width = rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0);

    let mut chart = String::new();
    for (label, count) in rows {
        let width = if max == 0 {
            0
        } else {
            ((count as f64 / max as f64) * CHART_WIDTH as f64).round() as usize
        };
        let bar = "▇".repeat(width.max(1));
        let _ = writeln!(chart, "{label:>label_width$}: {bar} {count:<5}");
    }
    chart
}

/// Console summary in the order: totals, latency, methods, statuses, chart.
pub fn render_summary(summary: &StatsSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nSummary:");
    let _ = writeln!(out, "Total requests: {}", summary.total);
    let _ = writeln!(out, "Average latency: {:.2} seconds", summary.latency_avg_secs);
    let _ = writeln!(out, "Min latency: {:.2} seconds", summary.latency_min_secs);
    let _ = writeln!(out, "Max latency: {:.2} seconds", summary.latency_max_secs);
    let _ = writeln!(
        out,
        "Latency p50/p95/p99: {:.2}/{:.2}/{:.2} seconds",
        summary.latency_p50_secs, summary.latency_p95_secs, summary.latency_p99_secs
    );
    let _ = writeln!(out, "Achieved rate: {:.2} req/s", summary.achieved_rps);
    let _ = writeln!(out, "\nMethod distribution:");
    for c in &summary.methods {
        let _ = writeln!(out, "  {}: {}", c.key, c.count);
    }
    let _ = writeln!(out, "\nStatus code distribution:");
    for c in &summary.statuses {
        let _ = writeln!(out, "  {}: {}", c.key, c.count);
    }
    let _ = writeln!(out, "\nLatency Distribution:");
    out.push_str(&render_histogram(summary));
    out
}
