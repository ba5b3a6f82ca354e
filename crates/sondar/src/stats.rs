//! Statistical sampling for benchmark loops.
//!
//! Benchmarks here are simple: call into the driver a few thousand times,
//! time each call, and summarize the distribution. [`Samples`] holds the
//! raw nanosecond values; [`measure`] runs a warmup-then-measure loop.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A collection of timing samples, in nanoseconds
#[derive(Debug, Clone, Default)]
pub struct Samples {
    ns: Vec<f64>,
}

impl Samples {
    /// Create an empty collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample
    pub fn push(&mut self, sample: Duration) {
        self.ns.push(sample.as_nanos() as f64);
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.ns.len()
    }

    /// Whether no sample was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ns.is_empty()
    }

    /// Smallest sample, in nanoseconds; `0.0` when empty
    #[must_use]
    pub fn min(&self) -> f64 {
        if self.ns.is_empty() {
            return 0.0;
        }
        self.ns.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Largest sample, in nanoseconds; `0.0` when empty
    #[must_use]
    pub fn max(&self) -> f64 {
        if self.ns.is_empty() {
            return 0.0;
        }
        self.ns.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Arithmetic mean, in nanoseconds
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.ns.is_empty() {
            return 0.0;
        }
        self.ns.iter().sum::<f64>() / self.ns.len() as f64
    }

    /// Population variance
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.ns.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        self.ns.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.ns.len() as f64
    }

    /// Population standard deviation
    #[must_use]
    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Percentile with linear interpolation between closest ranks.
    ///
    /// `p` is in `[0, 100]`; an empty collection yields `0.0`.
    #[must_use]
    pub fn percentile(&self, p: f64) -> f64 {
        if self.ns.is_empty() {
            return 0.0;
        }
        let mut sorted = self.ns.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        if lo == hi {
            return sorted[lo];
        }
        let weight = rank - lo as f64;
        sorted[lo] * (1.0 - weight) + sorted[hi] * weight
    }

    /// Build a serializable summary
    #[must_use]
    pub fn summary(&self, name: impl Into<String>) -> SampleSummary {
        SampleSummary {
            name: name.into(),
            count: self.len(),
            min_ns: self.min(),
            max_ns: self.max(),
            mean_ns: self.mean(),
            stddev_ns: self.stddev(),
            p50_ns: self.percentile(50.0),
            p90_ns: self.percentile(90.0),
            p99_ns: self.percentile(99.0),
        }
    }
}

/// Summary of a sampled distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    /// What was measured
    pub name: String,
    /// Number of samples
    pub count: usize,
    /// Minimum, nanoseconds
    pub min_ns: f64,
    /// Maximum, nanoseconds
    pub max_ns: f64,
    /// Mean, nanoseconds
    pub mean_ns: f64,
    /// Standard deviation, nanoseconds
    pub stddev_ns: f64,
    /// Median, nanoseconds
    pub p50_ns: f64,
    /// 90th percentile, nanoseconds
    pub p90_ns: f64,
    /// 99th percentile, nanoseconds
    pub p99_ns: f64,
}

/// Run a warmup-then-measure loop, timing each iteration of `f`
pub fn measure<F>(warmup: usize, iterations: usize, mut f: F) -> Samples
where
    F: FnMut(),
{
    for _ in 0..warmup {
        f();
    }

    let mut samples = Samples::new();
    for _ in 0..iterations {
        let start = Instant::now();
        f();
        samples.push(start.elapsed());
    }
    samples
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn from_ns(values: &[u64]) -> Samples {
        let mut samples = Samples::new();
        for v in values {
            samples.push(Duration::from_nanos(*v));
        }
        samples
    }

    #[test]
    fn empty_samples_are_all_zero() {
        let samples = Samples::new();
        assert!(samples.is_empty());
        assert_eq!(samples.min(), 0.0);
        assert_eq!(samples.max(), 0.0);
        assert_eq!(samples.mean(), 0.0);
        assert_eq!(samples.variance(), 0.0);
        assert_eq!(samples.percentile(50.0), 0.0);

        // Zero-iteration summaries must stay finite for JSON output.
        let summary = samples.summary("empty");
        assert_eq!(summary.count, 0);
        assert!(summary.min_ns.is_finite());
        assert!(summary.max_ns.is_finite());
    }

    #[test]
    fn mean_and_variance_of_known_values() {
        let samples = from_ns(&[1, 2, 3, 4, 5]);
        assert_eq!(samples.len(), 5);
        assert_eq!(samples.mean(), 3.0);
        assert_eq!(samples.variance(), 2.0);
        assert_eq!(samples.min(), 1.0);
        assert_eq!(samples.max(), 5.0);
    }

    #[test]
    fn percentiles_interpolate() {
        let samples = from_ns(&[10, 20]);
        assert_eq!(samples.percentile(0.0), 10.0);
        assert_eq!(samples.percentile(50.0), 15.0);
        assert_eq!(samples.percentile(100.0), 20.0);

        let samples = from_ns(&[5, 1, 3, 2, 4]);
        assert_eq!(samples.percentile(50.0), 3.0);
    }

    #[test]
    fn summary_collects_everything() {
        let summary = from_ns(&[1, 2, 3, 4, 5]).summary("version-ioctl");
        assert_eq!(summary.name, "version-ioctl");
        assert_eq!(summary.count, 5);
        assert_eq!(summary.mean_ns, 3.0);
        assert_eq!(summary.p50_ns, 3.0);
    }

    #[test]
    fn measure_times_every_iteration() {
        let mut calls = 0;
        let samples = measure(2, 10, || calls += 1);
        assert_eq!(calls, 12);
        assert_eq!(samples.len(), 10);
        assert!(samples.min() >= 0.0);
    }
}
