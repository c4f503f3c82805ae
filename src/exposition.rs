// ============================================================================
// PROMETHEUS TEXT EXPOSITION
// ============================================================================
// Renders a store snapshot in the text format (version 0.0.4) that a
// Prometheus scraper pulls from /metrics.
// ============================================================================

use std::fmt::Write;

use crate::metrics::{FamilySnapshot, HistogramSnapshot, MetricsSnapshot, Sample, SampleValue};

/// Content type of the rendered body.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render every non-empty family of the snapshot.
pub fn render(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::with_capacity(4096);
    for family in snapshot.families() {
        if family.samples.is_empty() {
            continue;
        }
        write_family(&mut out, family);
    }
    out
}

fn write_family(out: &mut String, family: &FamilySnapshot) {
    let metric = family.name;
    let _ = writeln!(out, "# HELP {metric} {}", escape_help(family.help));
    let _ = writeln!(out, "# TYPE {metric} {}", family.kind);

    for sample in &family.samples {
        match &sample.value {
            SampleValue::Counter(v) | SampleValue::Gauge(v) => {
                let labels = label_set(family.label_keys, sample, None);
                let _ = writeln!(out, "{metric}{labels} {}", format_value(*v));
            }
            SampleValue::Histogram(hist) => write_histogram(out, family, sample, hist),
        }
    }
}

fn write_histogram(
    out: &mut String,
    family: &FamilySnapshot,
    sample: &Sample,
    hist: &HistogramSnapshot,
) {
    let metric = family.name;
    for (bound, count) in hist.bounds.iter().zip(&hist.cumulative) {
        let le = format_value(*bound);
        let labels = label_set(family.label_keys, sample, Some(&le));
        let _ = writeln!(out, "{metric}_bucket{labels} {count}");
    }
    let labels = label_set(family.label_keys, sample, Some("+Inf"));
    let _ = writeln!(out, "{metric}_bucket{labels} {}", hist.count);

    let labels = label_set(family.label_keys, sample, None);
    let _ = writeln!(out, "{metric}_sum{labels} {}", format_value(hist.sum));
    let _ = writeln!(out, "{metric}_count{labels} {}", hist.count);
}

/// `{k1="v1",k2="v2"}` with an optional trailing `le`; empty when there are
/// no labels at all.
fn label_set(keys: &[&str], sample: &Sample, le: Option<&str>) -> String {
    let mut pairs: Vec<String> = keys
        .iter()
        .zip(&sample.labels)
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
        .collect();
    if let Some(le) = le {
        pairs.push(format!("le=\"{le}\""));
    }
    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs.join(","))
    }
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricDesc, MetricsStore};
    use pretty_assertions::assert_eq;

    static REQUESTS: MetricDesc =
        MetricDesc::counter("test_requests_total", "Requests served", &["service", "level"]);
    static SIZE: MetricDesc = MetricDesc::gauge("test_file_size_bytes", "File size", &["filename"]);
    static UPTIME: MetricDesc = MetricDesc::gauge("test_uptime_seconds", "Uptime", &[]);
    static LATENCY: MetricDesc =
        MetricDesc::histogram("test_latency_seconds", "Latency", &["service"], &[0.1, 1.0]);

    #[test]
    fn escapes_label_values() {
        assert_eq!(escape_label_value("a"), "a");
        assert_eq!(escape_label_value("a\"b"), "a\\\"b");
        assert_eq!(escape_label_value("a\\b"), "a\\\\b");
        assert_eq!(escape_label_value("a\nb"), "a\\nb");
    }

    #[test]
    fn renders_counters_and_gauges() {
        let store = MetricsStore::new();
        store.add_counter(&REQUESTS, &["web", "warn"], 2.0).unwrap();
        store.add_counter(&REQUESTS, &["api", "info"], 7.5).unwrap();
        store.set_gauge(&SIZE, &["my \"quoted\".log"], 1024.0).unwrap();
        store.set_gauge(&UPTIME, &[], 12.25).unwrap();

        let expected = "\
# HELP test_file_size_bytes File size
# TYPE test_file_size_bytes gauge
test_file_size_bytes{filename=\"my \\\"quoted\\\".log\"} 1024
# HELP test_requests_total Requests served
# TYPE test_requests_total counter
test_requests_total{service=\"api\",level=\"info\"} 7.5
test_requests_total{service=\"web\",level=\"warn\"} 2
# HELP test_uptime_seconds Uptime
# TYPE test_uptime_seconds gauge
test_uptime_seconds 12.25
";
        assert_eq!(render(&store.snapshot()), expected);
    }

    #[test]
    fn renders_histograms() {
        let store = MetricsStore::new();
        store.observe_histogram(&LATENCY, &["collector"], 0.05).unwrap();
        store.observe_histogram(&LATENCY, &["collector"], 0.5).unwrap();

        let expected = "\
# HELP test_latency_seconds Latency
# TYPE test_latency_seconds histogram
test_latency_seconds_bucket{service=\"collector\",le=\"0.1\"} 1
test_latency_seconds_bucket{service=\"collector\",le=\"1\"} 2
test_latency_seconds_bucket{service=\"collector\",le=\"+Inf\"} 2
test_latency_seconds_sum{service=\"collector\"} 0.55
test_latency_seconds_count{service=\"collector\"} 2
";
        assert_eq!(render(&store.snapshot()), expected);
    }

    #[test]
    fn empty_store_renders_nothing() {
        assert_eq!(render(&MetricsStore::new().snapshot()), "");
    }

    #[test]
    fn formats_special_values() {
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(3.0), "3");
    }
}
