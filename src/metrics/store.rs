// ============================================================================
// Metrics Store - Families of Labeled Series
// ============================================================================

use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;

use ahash::AHashMap;
use compact_str::CompactString;
use dashmap::DashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;

use super::atomic::{AtomicF64, HistogramAccumulator, HistogramSnapshot};
use super::{MetricDesc, MetricKind};
use crate::error::{MetricsError, MetricsResult};

/// Concrete label values of one series, in the family's label-key order.
pub type LabelValues = SmallVec<[CompactString; 4]>;

// ----------------------------------------------------------------------------
// Accumulators
// ----------------------------------------------------------------------------

#[derive(Debug)]
enum Accumulator {
    Counter(AtomicF64),
    Gauge(AtomicF64),
    Histogram(HistogramAccumulator),
}

#[derive(Debug, Clone, Copy)]
enum Update {
    Add(f64),
    Set(f64),
    Observe(f64),
}

impl Accumulator {
    fn new(desc: &MetricDesc) -> Self {
        match desc.kind {
            MetricKind::Counter => Accumulator::Counter(AtomicF64::default()),
            MetricKind::Gauge => Accumulator::Gauge(AtomicF64::default()),
            MetricKind::Histogram => {
                Accumulator::Histogram(HistogramAccumulator::new(desc.buckets))
            }
        }
    }

    fn apply(&self, update: Update) {
        match (self, update) {
            (Accumulator::Counter(v), Update::Add(delta)) => {
                v.fetch_add(delta, AtomicOrdering::Relaxed);
            }
            (Accumulator::Gauge(v), Update::Set(value)) => {
                v.store(value, AtomicOrdering::Relaxed);
            }
            (Accumulator::Histogram(h), Update::Observe(value)) => h.observe(value),
            // kind is checked against the family before any update is applied
            _ => {}
        }
    }

    fn read(&self) -> SampleValue {
        match self {
            Accumulator::Counter(v) => SampleValue::Counter(v.load(AtomicOrdering::Relaxed)),
            Accumulator::Gauge(v) => SampleValue::Gauge(v.load(AtomicOrdering::Relaxed)),
            Accumulator::Histogram(h) => SampleValue::Histogram(h.snapshot()),
        }
    }
}

// ----------------------------------------------------------------------------
// Family
// ----------------------------------------------------------------------------

struct Family {
    desc: MetricDesc,
    // Writers share this lock and update atomics in place; snapshot takes it
    // exclusively so no histogram is copied half-updated.
    series: RwLock<AHashMap<LabelValues, Accumulator>>,
}

impl Family {
    fn new(desc: MetricDesc) -> Self {
        Self {
            desc,
            series: RwLock::new(AHashMap::new()),
        }
    }

    fn update(&self, labels: &[&str], update: Update) {
        let key: LabelValues = labels.iter().map(|v| CompactString::from(*v)).collect();

        {
            let series = self.series.read();
            if let Some(acc) = series.get(&key) {
                acc.apply(update);
                return;
            }
        }

        let mut series = self.series.write();
        series
            .entry(key)
            .or_insert_with(|| Accumulator::new(&self.desc))
            .apply(update);
    }

    fn snapshot(&self) -> FamilySnapshot {
        let mut samples: Vec<Sample> = {
            let series = self.series.write();
            series
                .iter()
                .map(|(labels, acc)| Sample {
                    labels: labels.clone(),
                    value: acc.read(),
                })
                .collect()
        };
        samples.sort_by(|a, b| a.labels.cmp(&b.labels));

        FamilySnapshot {
            name: self.desc.name,
            help: self.desc.help,
            kind: self.desc.kind,
            label_keys: self.desc.label_keys,
            samples,
        }
    }
}

// ----------------------------------------------------------------------------
// Store
// ----------------------------------------------------------------------------

/// Concurrency-safe store of metric families.
///
/// Constructed explicitly and shared by `Arc` between the collection cycle
/// (writer) and the exposition endpoint (reader). No caller-side locking is
/// needed for concurrent writes and snapshots.
#[derive(Default)]
pub struct MetricsStore {
    families: DashMap<&'static str, Arc<Family>>,
}

impl MetricsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a non-negative delta to a counter series.
    ///
    /// Negative, NaN and infinite deltas are rejected and leave the series
    /// untouched.
    pub fn add_counter(&self, desc: &MetricDesc, labels: &[&str], delta: f64) -> MetricsResult<()> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(MetricsError::NegativeDelta {
                metric: desc.name,
                delta,
            });
        }
        self.family(desc, MetricKind::Counter, labels.len())?
            .update(labels, Update::Add(delta));
        Ok(())
    }

    /// Overwrite a gauge series.
    pub fn set_gauge(&self, desc: &MetricDesc, labels: &[&str], value: f64) -> MetricsResult<()> {
        self.family(desc, MetricKind::Gauge, labels.len())?
            .update(labels, Update::Set(value));
        Ok(())
    }

    /// Record one observation into a histogram series.
    pub fn observe_histogram(
        &self,
        desc: &MetricDesc,
        labels: &[&str],
        value: f64,
    ) -> MetricsResult<()> {
        self.family(desc, MetricKind::Histogram, labels.len())?
            .update(labels, Update::Observe(value));
        Ok(())
    }

    /// Immutable point-in-time copy of every family, sorted by metric name.
    pub fn snapshot(&self) -> MetricsSnapshot {
        // Collect handles first so no map shard stays locked while copying.
        let families: Vec<Arc<Family>> = self.families.iter().map(|e| e.value().clone()).collect();

        let mut families: Vec<FamilySnapshot> = families.iter().map(|f| f.snapshot()).collect();
        families.sort_by(|a, b| a.name.cmp(b.name));

        MetricsSnapshot { families }
    }

    /// Number of registered families.
    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    fn family(
        &self,
        desc: &MetricDesc,
        requested: MetricKind,
        arity: usize,
    ) -> MetricsResult<Arc<Family>> {
        check_shape(desc, requested, arity)?;

        let family = self
            .families
            .entry(desc.name)
            .or_insert_with(|| Arc::new(Family::new(*desc)))
            .value()
            .clone();

        // A family keeps the shape of its first writer.
        check_shape(&family.desc, requested, arity)?;
        Ok(family)
    }
}

fn check_shape(desc: &MetricDesc, requested: MetricKind, arity: usize) -> MetricsResult<()> {
    if desc.kind != requested {
        return Err(MetricsError::KindMismatch {
            metric: desc.name,
            registered: desc.kind.as_str(),
            requested: requested.as_str(),
        });
    }
    if desc.label_keys.len() != arity {
        return Err(MetricsError::LabelArity {
            metric: desc.name,
            expected: desc.label_keys.len(),
            actual: arity,
        });
    }
    Ok(())
}

impl Debug for MetricsStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsStore")
            .field("families", &self.families.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Snapshots
// ----------------------------------------------------------------------------

/// Value of one series at snapshot time.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Counter(f64),
    Gauge(f64),
    Histogram(HistogramSnapshot),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: LabelValues,
    pub value: SampleValue,
}

impl Sample {
    fn matches(&self, labels: &[&str]) -> bool {
        self.labels.len() == labels.len()
            && self.labels.iter().zip(labels).all(|(a, b)| a.as_str() == *b)
    }
}

/// Every series of one family, sorted by label values.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilySnapshot {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub label_keys: &'static [&'static str],
    pub samples: Vec<Sample>,
}

impl FamilySnapshot {
    pub fn sample(&self, labels: &[&str]) -> Option<&Sample> {
        self.samples.iter().find(|s| s.matches(labels))
    }
}

/// Consistent, immutable copy of the store taken for rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    families: Vec<FamilySnapshot>,
}

impl MetricsSnapshot {
    pub fn families(&self) -> &[FamilySnapshot] {
        &self.families
    }

    pub fn family(&self, name: &str) -> Option<&FamilySnapshot> {
        self.families.iter().find(|f| f.name == name)
    }

    /// Value of a counter series, if it has been written.
    pub fn counter(&self, name: &str, labels: &[&str]) -> Option<f64> {
        match self.family(name)?.sample(labels)?.value {
            SampleValue::Counter(v) => Some(v),
            _ => None,
        }
    }

    /// Value of a gauge series, if it has been written.
    pub fn gauge(&self, name: &str, labels: &[&str]) -> Option<f64> {
        match self.family(name)?.sample(labels)?.value {
            SampleValue::Gauge(v) => Some(v),
            _ => None,
        }
    }

    pub fn histogram(&self, name: &str, labels: &[&str]) -> Option<&HistogramSnapshot> {
        match &self.family(name)?.sample(labels)?.value {
            SampleValue::Histogram(h) => Some(h),
            _ => None,
        }
    }

    /// Number of series in a family; 0 when the family does not exist.
    pub fn series_count(&self, name: &str) -> usize {
        self.family(name).map_or(0, |f| f.samples.len())
    }

    /// Sum of every counter series of a family.
    pub fn counter_total(&self, name: &str) -> f64 {
        self.family(name).map_or(0.0, |f| {
            f.samples
                .iter()
                .filter_map(|s| match s.value {
                    SampleValue::Counter(v) => Some(v),
                    _ => None,
                })
                .sum()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::catalog;
    use std::collections::HashSet;

    static TEST_COUNTER: MetricDesc =
        MetricDesc::counter("test_events_total", "Test events", &["service", "level"]);
    static TEST_GAUGE: MetricDesc = MetricDesc::gauge("test_size_bytes", "Test size", &["file"]);
    static TEST_HISTOGRAM: MetricDesc =
        MetricDesc::histogram("test_duration_seconds", "Test duration", &[], &[0.1, 1.0]);

    #[test]
    fn test_counter_additivity() {
        let store = MetricsStore::new();
        store.add_counter(&TEST_COUNTER, &["api", "info"], 2.5).unwrap();
        store.add_counter(&TEST_COUNTER, &["api", "info"], 4.0).unwrap();
        store.add_counter(&TEST_COUNTER, &["api", "warn"], 1.0).unwrap();

        let snap = store.snapshot();
        assert_eq!(snap.counter("test_events_total", &["api", "info"]), Some(6.5));
        assert_eq!(snap.counter("test_events_total", &["api", "warn"]), Some(1.0));
        assert_eq!(snap.counter_total("test_events_total"), 7.5);
    }

    #[test]
    fn test_counter_zero_delta_creates_series() {
        let store = MetricsStore::new();
        store.add_counter(&TEST_COUNTER, &["api", "debug"], 0.0).unwrap();
        assert_eq!(
            store.snapshot().counter("test_events_total", &["api", "debug"]),
            Some(0.0)
        );
    }

    #[test]
    fn test_negative_delta_rejected_and_series_unchanged() {
        let store = MetricsStore::new();
        store.add_counter(&TEST_COUNTER, &["api", "info"], 3.0).unwrap();

        let err = store
            .add_counter(&TEST_COUNTER, &["api", "info"], -1.0)
            .unwrap_err();
        assert!(matches!(err, MetricsError::NegativeDelta { delta, .. } if delta == -1.0));
        assert_eq!(
            store.snapshot().counter("test_events_total", &["api", "info"]),
            Some(3.0)
        );

        // rejected writes never create a series
        assert!(store.add_counter(&TEST_COUNTER, &["web", "info"], -0.5).is_err());
        assert!(store.add_counter(&TEST_COUNTER, &["web", "info"], f64::NAN).is_err());
        assert!(store
            .add_counter(&TEST_COUNTER, &["web", "info"], f64::INFINITY)
            .is_err());
        assert_eq!(store.snapshot().series_count("test_events_total"), 1);
    }

    #[test]
    fn test_negative_delta_on_fresh_store_creates_nothing() {
        let store = MetricsStore::new();
        assert!(store.add_counter(&TEST_COUNTER, &["api", "info"], -2.0).is_err());
        assert_eq!(store.family_count(), 0);
        assert!(store.snapshot().families().is_empty());
    }

    #[test]
    fn test_gauge_last_write_wins() {
        let store = MetricsStore::new();
        store.set_gauge(&TEST_GAUGE, &["app.log"], 10.0).unwrap();
        let between = store.snapshot();
        store.set_gauge(&TEST_GAUGE, &["app.log"], 4.0).unwrap();

        assert_eq!(between.gauge("test_size_bytes", &["app.log"]), Some(10.0));
        assert_eq!(store.snapshot().gauge("test_size_bytes", &["app.log"]), Some(4.0));
    }

    #[test]
    fn test_histogram_observe() {
        let store = MetricsStore::new();
        store.observe_histogram(&TEST_HISTOGRAM, &[], 0.05).unwrap();
        store.observe_histogram(&TEST_HISTOGRAM, &[], 0.5).unwrap();
        store.observe_histogram(&TEST_HISTOGRAM, &[], 5.0).unwrap();

        let snap = store.snapshot();
        let hist = snap.histogram("test_duration_seconds", &[]).unwrap();
        assert_eq!(hist.cumulative, vec![1, 2]);
        assert_eq!(hist.count, 3);
        assert!((hist.sum - 5.55).abs() < 1e-9);
    }

    #[test]
    fn test_label_arity_mismatch() {
        let store = MetricsStore::new();
        let err = store.add_counter(&TEST_COUNTER, &["api"], 1.0).unwrap_err();
        assert_eq!(
            err,
            MetricsError::LabelArity {
                metric: "test_events_total",
                expected: 2,
                actual: 1,
            }
        );
    }

    #[test]
    fn test_kind_mismatch() {
        let store = MetricsStore::new();
        let err = store.set_gauge(&TEST_COUNTER, &["api", "info"], 1.0).unwrap_err();
        assert!(matches!(err, MetricsError::KindMismatch { requested: "gauge", .. }));

        // same name registered with a different shape keeps the first shape
        static CLASH: MetricDesc = MetricDesc::gauge("test_events_total", "Clash", &["service"]);
        store.add_counter(&TEST_COUNTER, &["api", "info"], 1.0).unwrap();
        assert!(matches!(
            store.set_gauge(&CLASH, &["api"], 1.0),
            Err(MetricsError::KindMismatch { registered: "counter", .. })
        ));
    }

    #[test]
    fn test_snapshot_sorted_and_isolated() {
        let store = MetricsStore::new();
        store.set_gauge(&TEST_GAUGE, &["b.log"], 2.0).unwrap();
        store.set_gauge(&TEST_GAUGE, &["a.log"], 1.0).unwrap();
        store.add_counter(&TEST_COUNTER, &["api", "info"], 1.0).unwrap();

        let snap = store.snapshot();
        let names: Vec<_> = snap.families().iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["test_events_total", "test_size_bytes"]);

        let files: Vec<_> = snap.family("test_size_bytes").unwrap().samples.iter()
            .map(|s| s.labels[0].as_str())
            .collect();
        assert_eq!(files, vec!["a.log", "b.log"]);

        store.add_counter(&TEST_COUNTER, &["api", "info"], 1.0).unwrap();
        assert_eq!(snap.counter("test_events_total", &["api", "info"]), Some(1.0));
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let store = Arc::new(MetricsStore::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        store.add_counter(&TEST_COUNTER, &["api", "info"], 1.0).unwrap();
                        store.observe_histogram(&TEST_HISTOGRAM, &[], 0.5).unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            let snap = store.snapshot();
            if let Some(hist) = snap.histogram("test_duration_seconds", &[]) {
                assert_eq!(hist.cumulative[1], hist.count);
            }
        }
        for writer in writers {
            writer.join().unwrap();
        }

        let snap = store.snapshot();
        assert_eq!(snap.counter("test_events_total", &["api", "info"]), Some(2000.0));
        assert_eq!(snap.histogram("test_duration_seconds", &[]).unwrap().count, 2000);
    }

    #[test]
    fn test_catalog_names_are_unique() {
        let names: HashSet<_> = catalog::all().iter().map(|d| d.name).collect();
        assert_eq!(names.len(), catalog::all().len());
        assert!(names.iter().all(|n| n.starts_with("snaproom_")));
    }
}
