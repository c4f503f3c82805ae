// ============================================================================
// METRICS STORE
// ============================================================================
// In-memory aggregation of named, labeled series:
// - Counters (add non-negative delta), gauges (last write wins),
//   histograms (cumulative buckets plus count and sum)
// - Families are declared statically through `MetricDesc` and created
//   lazily on first write
// - Snapshots are immutable copies taken for exposition
// ============================================================================

mod atomic;
pub mod catalog;
mod store;

use std::fmt::{self, Display, Formatter};

pub use atomic::{AtomicF64, HistogramAccumulator, HistogramSnapshot, DEFAULT_BUCKETS};
pub use store::{FamilySnapshot, LabelValues, MetricsSnapshot, MetricsStore, Sample, SampleValue};

/// Accumulator kind of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl Display for MetricKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a metric family: its name, help text, kind and the
/// ordered label keys every series of the family carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub label_keys: &'static [&'static str],
    /// Bucket upper bounds; empty for counters and gauges.
    pub buckets: &'static [f64],
}

impl MetricDesc {
    pub const fn counter(
        name: &'static str,
        help: &'static str,
        label_keys: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Counter,
            label_keys,
            buckets: &[],
        }
    }

    pub const fn gauge(
        name: &'static str,
        help: &'static str,
        label_keys: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Gauge,
            label_keys,
            buckets: &[],
        }
    }

    pub const fn histogram(
        name: &'static str,
        help: &'static str,
        label_keys: &'static [&'static str],
        buckets: &'static [f64],
    ) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Histogram,
            label_keys,
            buckets,
        }
    }
}
