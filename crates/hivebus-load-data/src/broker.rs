/// Per-broker load snapshot
/// One record per live broker, written by that broker's reporter and read by
/// the shedding pipeline on the leader.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

fn instant_now() -> Instant {
    Instant::now()
}

/// Short-term stats for a single bundle, as reported by its owning broker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleStats {
    pub topics: u64,
    pub producer_count: u64,
    pub consumer_count: u64,
    pub msg_throughput_in: f64,
    pub msg_throughput_out: f64,
}

impl BundleStats {
    /// Combined in+out throughput in bytes/s
    pub fn total_throughput(&self) -> f64 {
        self.msg_throughput_in + self.msg_throughput_out
    }

    /// Producer and consumer sessions attached to this bundle
    pub fn sessions(&self) -> u64 {
        self.producer_count.saturating_add(self.consumer_count)
    }
}

/// Load snapshot for a single broker
///
/// Resource usages are fractions of the configured limit and normally sit in
/// [0.0, 1.0]; values above 1.0 happen with misconfigured limits and are
/// sanitized by the usage evaluator rather than rejected here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerLoadData {
    pub cpu: f64,
    pub memory: f64,
    pub direct_memory: f64,
    pub bandwidth_in: f64,
    pub bandwidth_out: f64,
    /// Aggregate broker ingress throughput in bytes/s
    pub msg_throughput_in: f64,
    /// Aggregate broker egress throughput in bytes/s
    pub msg_throughput_out: f64,
    /// Bundles currently owned by this broker
    pub bundles: HashSet<String>,
    /// Per-bundle short-term stats; keys may briefly include bundles the
    /// broker no longer owns
    pub last_stats: HashMap<String, BundleStats>,
    /// Monotonic timestamp of the last report
    #[serde(skip, default = "instant_now")]
    pub reported_at: Instant,
}

impl Default for BrokerLoadData {
    fn default() -> Self {
        BrokerLoadData {
            cpu: 0.0,
            memory: 0.0,
            direct_memory: 0.0,
            bandwidth_in: 0.0,
            bandwidth_out: 0.0,
            msg_throughput_in: 0.0,
            msg_throughput_out: 0.0,
            bundles: HashSet::new(),
            last_stats: HashMap::new(),
            reported_at: Instant::now(),
        }
    }
}

impl BrokerLoadData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combined in+out throughput in bytes/s
    pub fn total_throughput(&self) -> f64 {
        self.msg_throughput_in + self.msg_throughput_out
    }

    /// Refresh the report timestamp (reporter path)
    pub fn touch(&mut self) {
        self.reported_at = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_stats_totals() {
        let stats = BundleStats {
            topics: 4,
            producer_count: 3,
            consumer_count: 7,
            msg_throughput_in: 100.0,
            msg_throughput_out: 50.0,
        };
        assert_eq!(stats.total_throughput(), 150.0);
        assert_eq!(stats.sessions(), 10);
    }

    #[test]
    fn test_broker_total_throughput() {
        let mut load = BrokerLoadData::new();
        load.msg_throughput_in = 1024.0;
        load.msg_throughput_out = 2048.0;
        assert_eq!(load.total_throughput(), 3072.0);
    }

    #[test]
    fn test_serde_round_trip_skips_timestamp() {
        let mut load = BrokerLoadData::new();
        load.cpu = 0.5;
        load.bundles.insert("ns/0x00_0x80".to_string());
        load.last_stats
            .insert("ns/0x00_0x80".to_string(), BundleStats::default());

        let json = serde_json::to_string(&load).expect("serialize");
        let back: BrokerLoadData = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.cpu, 0.5);
        assert!(back.bundles.contains("ns/0x00_0x80"));
    }
}
