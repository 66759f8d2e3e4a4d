/// Per-bundle time-averaged load
/// Two horizons are kept: a long-term average (hours) that drives split
/// decisions and a short-term average (minutes) for placement heuristics.

use serde::{Deserialize, Serialize};

/// Samples folded into the long-term horizon before it becomes a pure EWMA
pub const LONG_TERM_SAMPLES: u64 = 1000;
/// Samples folded into the short-term horizon
pub const SHORT_TERM_SAMPLES: u64 = 10;

/// Running average over a bounded number of samples
///
/// Behaves as an arithmetic mean until `max_samples` reports have been folded
/// in, then decays like an EWMA with weight `1/max_samples`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeAverageData {
    pub total_msg_rate: f64,
    pub total_msg_throughput: f64,
    samples: u64,
    max_samples: u64,
}

impl TimeAverageData {
    pub fn new(max_samples: u64) -> Self {
        TimeAverageData {
            total_msg_rate: 0.0,
            total_msg_throughput: 0.0,
            samples: 0,
            max_samples: max_samples.max(1),
        }
    }

    /// Fold one sample into the average
    pub fn update(&mut self, msg_rate: f64, msg_throughput: f64) {
        self.samples = (self.samples + 1).min(self.max_samples);
        let n = self.samples as f64;
        self.total_msg_rate += (msg_rate - self.total_msg_rate) / n;
        self.total_msg_throughput += (msg_throughput - self.total_msg_throughput) / n;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// Aggregated load history for one bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleData {
    pub long_term: TimeAverageData,
    pub short_term: TimeAverageData,
}

impl Default for BundleData {
    fn default() -> Self {
        BundleData {
            long_term: TimeAverageData::new(LONG_TERM_SAMPLES),
            short_term: TimeAverageData::new(SHORT_TERM_SAMPLES),
        }
    }
}

impl BundleData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one reporter sample into both horizons
    pub fn update(&mut self, msg_rate: f64, msg_throughput: f64) {
        self.long_term.update(msg_rate, msg_throughput);
        self.short_term.update(msg_rate, msg_throughput);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_is_taken_verbatim() {
        let mut avg = TimeAverageData::new(10);
        avg.update(100.0, 2000.0);
        assert_eq!(avg.total_msg_rate, 100.0);
        assert_eq!(avg.total_msg_throughput, 2000.0);
        assert_eq!(avg.samples(), 1);
    }

    #[test]
    fn test_running_mean_before_cap() {
        let mut avg = TimeAverageData::new(10);
        avg.update(100.0, 0.0);
        avg.update(200.0, 0.0);
        assert!((avg.total_msg_rate - 150.0).abs() < 1e-9);
        avg.update(300.0, 0.0);
        assert!((avg.total_msg_rate - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_count_saturates_at_cap() {
        let mut avg = TimeAverageData::new(3);
        for _ in 0..10 {
            avg.update(50.0, 50.0);
        }
        assert_eq!(avg.samples(), 3);
        assert!((avg.total_msg_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_bundle_data_updates_both_horizons() {
        let mut data = BundleData::new();
        data.update(10.0, 1024.0);
        assert_eq!(data.long_term.total_msg_rate, 10.0);
        assert_eq!(data.short_term.total_msg_rate, 10.0);

        // Short-term horizon converges faster than long-term
        for _ in 0..20 {
            data.update(100.0, 1024.0);
        }
        assert!(data.short_term.total_msg_rate > data.long_term.total_msg_rate);
    }
}
