// Per-thread alignment statistics and their run-level aggregation.
//
// Every worker owns a private RunStats for its lifetime; the only shared
// mutation is the additive merge at thread completion, which keeps the
// per-read hot path lock-free. Merging is field-wise addition, so the order
// in which threads finish cannot affect the totals.

use std::any::Any;

/// Extension-supplied counters carried alongside the built-in ones.
pub trait ExtraStats: Send + Sync {
    fn add(&mut self, other: &dyn ExtraStats);
    fn print(&self);
    fn as_any(&self) -> &dyn Any;
}

pub const TIME_BUCKETS: usize = 31;

/// Log2-bucketed per-read alignment time histogram.
#[derive(Clone)]
pub struct TimeHistogram {
    pub counts: [u64; TIME_BUCKETS],
    pub total_nanos: [u64; TIME_BUCKETS],
}

impl TimeHistogram {
    pub fn new() -> Self {
        TimeHistogram {
            counts: [0; TIME_BUCKETS],
            total_nanos: [0; TIME_BUCKETS],
        }
    }

    pub fn record(&mut self, nanos: u64) {
        let bucket = (63 - nanos.max(1).leading_zeros() as usize).min(TIME_BUCKETS - 1);
        self.counts[bucket] += 1;
        self.total_nanos[bucket] += nanos;
    }

    fn add(&mut self, other: &TimeHistogram) {
        for i in 0..TIME_BUCKETS {
            self.counts[i] += other.counts[i];
            self.total_nanos[i] += other.total_nanos[i];
        }
    }
}

impl Default for TimeHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for one alignment pass.
///
/// All counters are 64-bit; run totals over billions of reads must not wrap.
#[derive(Default)]
pub struct RunStats {
    pub total_reads: u64,
    pub useful_reads: u64,
    pub single_hits: u64,
    pub multi_hits: u64,
    pub not_found: u64,
    pub aligned_as_pairs: u64,
    pub lv_calls: u64,
    pub time_histogram: Option<Box<TimeHistogram>>,
    pub extra: Option<Box<dyn ExtraStats>>,
}

impl RunStats {
    /// Fresh zeroed stats, with histogram buckets when requested.
    pub fn new(with_time_histogram: bool) -> Self {
        RunStats {
            time_histogram: with_time_histogram.then(|| Box::new(TimeHistogram::new())),
            ..Default::default()
        }
    }

    /// Merge another thread's counters into this one, consuming them.
    pub fn add(&mut self, other: RunStats) {
        self.total_reads += other.total_reads;
        self.useful_reads += other.useful_reads;
        self.single_hits += other.single_hits;
        self.multi_hits += other.multi_hits;
        self.not_found += other.not_found;
        self.aligned_as_pairs += other.aligned_as_pairs;
        self.lv_calls += other.lv_calls;
        match (&mut self.time_histogram, other.time_histogram) {
            (Some(mine), Some(theirs)) => mine.add(&theirs),
            (None, Some(theirs)) => self.time_histogram = Some(theirs),
            _ => {}
        }
        match (&mut self.extra, other.extra) {
            (Some(mine), Some(theirs)) => mine.add(theirs.as_ref()),
            (None, Some(theirs)) => self.extra = Some(theirs),
            _ => {}
        }
    }

    pub fn reset(&mut self) {
        let keep_histogram = self.time_histogram.is_some();
        *self = RunStats::new(keep_histogram);
    }
}

/// Ratio as a percentage with a divide-by-zero guard: an empty run reports
/// 0% rather than NaN.
pub fn percent(numerator: u64, denominator: u64) -> f64 {
    100.0 * numerator as f64 / denominator.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seed: u64) -> RunStats {
        let mut s = RunStats::new(false);
        s.total_reads = seed;
        s.useful_reads = seed / 2;
        s.single_hits = seed / 3;
        s.multi_hits = seed / 5;
        s.not_found = seed / 7;
        s.aligned_as_pairs = seed / 11;
        s.lv_calls = seed * 13;
        s
    }

    fn totals(stats: &RunStats) -> [u64; 7] {
        [
            stats.total_reads,
            stats.useful_reads,
            stats.single_hits,
            stats.multi_hits,
            stats.not_found,
            stats.aligned_as_pairs,
            stats.lv_calls,
        ]
    }

    #[test]
    fn test_new_is_zeroed() {
        let stats = RunStats::new(false);
        assert_eq!(totals(&stats), [0; 7]);
        assert!(stats.time_histogram.is_none());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let seeds = [100u64, 37, 9999, 1, 123_456];
        let mut forward = RunStats::new(false);
        for &s in &seeds {
            forward.add(sample(s));
        }
        let mut backward = RunStats::new(false);
        for &s in seeds.iter().rev() {
            backward.add(sample(s));
        }
        // Rotated order as a third permutation.
        let mut rotated = RunStats::new(false);
        for &s in seeds.iter().cycle().skip(2).take(seeds.len()) {
            rotated.add(sample(s));
        }
        assert_eq!(totals(&forward), totals(&backward));
        assert_eq!(totals(&forward), totals(&rotated));
    }

    #[test]
    fn test_merge_is_associative() {
        let mut left = sample(10);
        let mut inner = sample(20);
        inner.add(sample(30));
        left.add(inner);

        let mut right = sample(10);
        right.add(sample(20));
        right.add(sample(30));

        assert_eq!(totals(&left), totals(&right));
    }

    #[test]
    fn test_histogram_merge() {
        let mut a = RunStats::new(true);
        let mut b = RunStats::new(true);
        a.time_histogram.as_mut().unwrap().record(1024);
        b.time_histogram.as_mut().unwrap().record(1500);
        b.time_histogram.as_mut().unwrap().record(2);
        a.add(b);
        let hist = a.time_histogram.as_ref().unwrap();
        assert_eq!(hist.counts[10], 2); // 1024 and 1500 share the 2^10 bucket
        assert_eq!(hist.counts[1], 1);
        assert_eq!(hist.counts.iter().sum::<u64>(), 3);
    }

    #[test]
    fn test_histogram_bucket_edges() {
        let mut hist = TimeHistogram::new();
        hist.record(0); // clamps to bucket 0 rather than underflowing
        hist.record(1);
        hist.record(u64::MAX); // clamps to the top bucket
        assert_eq!(hist.counts[0], 2);
        assert_eq!(hist.counts[TIME_BUCKETS - 1], 1);
    }

    #[test]
    fn test_reset_keeps_histogram_presence() {
        let mut with = RunStats::new(true);
        with.total_reads = 5;
        with.reset();
        assert_eq!(with.total_reads, 0);
        assert!(with.time_histogram.is_some());

        let mut without = RunStats::new(false);
        without.reset();
        assert!(without.time_histogram.is_none());
    }

    #[test]
    fn test_percent_guards_empty_run() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(50, 100), 50.0);
        // A nonzero numerator over a zero denominator stays finite.
        assert!(percent(5, 0).is_finite());
    }
}
