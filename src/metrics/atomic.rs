// ============================================================================
// ATOMIC ACCUMULATORS
// ============================================================================
// Lock-free cells backing every series in the store:
// - AtomicF64 for counters and gauges
// - HistogramAccumulator with cumulative buckets
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

// ----------------------------------------------------------------------------
// Atomic Float
// ----------------------------------------------------------------------------

/// An atomic f64 value using bit casting to AtomicU64.
#[derive(Debug)]
#[repr(transparent)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    /// Create a new atomic f64.
    #[inline]
    pub const fn new(val: f64) -> Self {
        Self {
            bits: AtomicU64::new(val.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self, ordering: AtomicOrdering) -> f64 {
        f64::from_bits(self.bits.load(ordering))
    }

    #[inline]
    pub fn store(&self, val: f64, ordering: AtomicOrdering) {
        self.bits.store(val.to_bits(), ordering);
    }

    /// Add a value atomically (using CAS loop). Returns the previous value.
    #[inline]
    pub fn fetch_add(&self, val: f64, ordering: AtomicOrdering) -> f64 {
        let mut current = self.bits.load(AtomicOrdering::Relaxed);
        loop {
            let new = (f64::from_bits(current) + val).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, new, ordering, AtomicOrdering::Relaxed)
            {
                Ok(prev) => return f64::from_bits(prev),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

// ----------------------------------------------------------------------------
// Histogram Accumulator
// ----------------------------------------------------------------------------

/// Default duration buckets in seconds.
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Lock-free histogram with cumulative buckets: an observation increments
/// every bucket whose upper bound is greater than or equal to the value.
#[derive(Debug)]
pub struct HistogramAccumulator {
    bounds: Vec<f64>,
    cumulative: Vec<AtomicU64>,
    count: AtomicU64,
    sum: AtomicF64,
}

impl HistogramAccumulator {
    /// Create a new histogram with the given bucket bounds.
    /// Bounds are sorted and deduplicated; NaN bounds are dropped.
    pub fn new(bounds: &[f64]) -> Self {
        let mut sorted: Vec<f64> = bounds.iter().copied().filter(|b| !b.is_nan()).collect();
        sorted.sort_by(f64::total_cmp);
        sorted.dedup();

        let cumulative = sorted.iter().map(|_| AtomicU64::new(0)).collect();

        Self {
            bounds: sorted,
            cumulative,
            count: AtomicU64::new(0),
            sum: AtomicF64::new(0.0),
        }
    }

    /// Observe a value. NaN is dropped: it has no bucket and would poison
    /// the sum.
    #[inline]
    pub fn observe(&self, value: f64) {
        if value.is_nan() {
            return;
        }
        let first = self.bounds.partition_point(|&b| b < value);
        for bucket in &self.cumulative[first..] {
            bucket.fetch_add(1, AtomicOrdering::Relaxed);
        }
        self.count.fetch_add(1, AtomicOrdering::Relaxed);
        self.sum.fetch_add(value, AtomicOrdering::Relaxed);
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(AtomicOrdering::Relaxed)
    }

    #[inline]
    pub fn sum(&self) -> f64 {
        self.sum.load(AtomicOrdering::Relaxed)
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            bounds: self.bounds.clone(),
            cumulative: self
                .cumulative
                .iter()
                .map(|b| b.load(AtomicOrdering::Relaxed))
                .collect(),
            count: self.count(),
            sum: self.sum(),
        }
    }
}

/// Snapshot of a histogram. `cumulative[i]` counts observations `<= bounds[i]`;
/// `count` is the implicit `+Inf` bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub bounds: Vec<f64>,
    pub cumulative: Vec<u64>,
    pub count: u64,
    pub sum: f64,
}

impl HistogramSnapshot {
    /// Cumulative count for the bucket with exactly this upper bound.
    pub fn bucket(&self, bound: f64) -> Option<u64> {
        self.bounds
            .iter()
            .position(|&b| b == bound)
            .map(|idx| self.cumulative[idx])
    }
}
