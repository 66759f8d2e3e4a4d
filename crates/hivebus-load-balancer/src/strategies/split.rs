/// Bundle split selection
/// Flags bundles whose topic count, session count, or sustained long-term
/// load has outgrown a single placement unit, respecting the per-namespace
/// bundle cap.

use hivebus_load_data::{BrokerLoadData, BundleData, LoadDataStore};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cluster::{split_bundle_id, NamespaceService};
use crate::config::BalancerConfig;

pub struct BundleSplitStrategy;

impl BundleSplitStrategy {
    pub fn new() -> Self {
        BundleSplitStrategy
    }

    /// Select the set of bundles to split
    ///
    /// Topic and session triggers use the reporters' short-term stats; rate
    /// and bandwidth triggers use the long-term averages so a bundle only
    /// splits after sustained load. A failed namespace query skips that
    /// bundle without failing the pass.
    pub async fn find_bundles_to_split(
        &self,
        loads: &[(String, BrokerLoadData)],
        bundle_loads: &dyn LoadDataStore<BundleData>,
        namespaces: &dyn NamespaceService,
        config: &BalancerConfig,
        rpc_timeout: Duration,
    ) -> HashSet<String> {
        let max_topics = config.load_balancer_namespace_bundle_max_topics;
        let max_sessions = config.load_balancer_namespace_bundle_max_sessions;
        let max_rate = config.load_balancer_namespace_bundle_max_msg_rate;
        let max_bandwidth_bytes = config.max_bundle_bandwidth_bytes();
        let max_namespace_bundles = config.load_balancer_namespace_maximum_bundles;

        let mut to_split = HashSet::new();
        for (broker, load) in loads {
            for (bundle, stats) in &load.last_stats {
                if to_split.contains(bundle) {
                    continue;
                }
                if stats.topics < 2 {
                    info!(bundle = %bundle, "single-topic bundle cannot be split");
                    continue;
                }

                let (long_term_rate, long_term_throughput) = match bundle_loads.get(bundle) {
                    Ok(Some(data)) => (
                        data.long_term.total_msg_rate,
                        data.long_term.total_msg_throughput,
                    ),
                    Ok(None) => (0.0, 0.0),
                    Err(e) => {
                        warn!(bundle = %bundle, error = %e, "bundle load read failed, treating as idle");
                        (0.0, 0.0)
                    }
                };

                let oversized = stats.topics > max_topics
                    || (max_sessions > 0 && stats.sessions() > max_sessions)
                    || long_term_rate > max_rate
                    || long_term_throughput > max_bandwidth_bytes;
                if !oversized {
                    continue;
                }

                let namespace = match split_bundle_id(bundle) {
                    Ok((namespace, _range)) => namespace,
                    Err(e) => {
                        warn!(bundle = %bundle, error = %e, "skipping bundle with malformed id");
                        continue;
                    }
                };

                match tokio::time::timeout(rpc_timeout, namespaces.bundle_count(namespace)).await {
                    Ok(Ok(count)) if count < max_namespace_bundles => {
                        info!(
                            broker = %broker,
                            bundle = %bundle,
                            topics = stats.topics,
                            sessions = stats.sessions(),
                            long_term_rate = long_term_rate,
                            "bundle flagged for split"
                        );
                        to_split.insert(bundle.clone());
                    }
                    Ok(Ok(count)) => {
                        debug!(
                            namespace = %namespace,
                            bundles = count,
                            cap = max_namespace_bundles,
                            "namespace bundle cap reached, not splitting"
                        );
                    }
                    Ok(Err(e)) => {
                        warn!(bundle = %bundle, error = %e, "namespace bundle-count query failed, skipping");
                    }
                    Err(_) => {
                        warn!(bundle = %bundle, "namespace bundle-count query timed out, skipping");
                    }
                }
            }
        }
        to_split
    }
}

impl Default for BundleSplitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BalancerError;
    use async_trait::async_trait;
    use hivebus_load_data::{BundleStats, InMemoryLoadStore};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct StaticNamespaces {
        counts: HashMap<String, u32>,
        failing: Mutex<HashSet<String>>,
    }

    impl StaticNamespaces {
        fn new(counts: &[(&str, u32)]) -> Self {
            StaticNamespaces {
                counts: counts
                    .iter()
                    .map(|(namespace, count)| (namespace.to_string(), *count))
                    .collect(),
                failing: Mutex::new(HashSet::new()),
            }
        }

        fn fail_namespace(&self, namespace: &str) {
            self.failing.lock().insert(namespace.to_string());
        }
    }

    #[async_trait]
    impl NamespaceService for StaticNamespaces {
        async fn bundle_count(&self, namespace: &str) -> Result<u32, BalancerError> {
            if self.failing.lock().contains(namespace) {
                return Err(BalancerError::Namespace("metadata timeout".to_string()));
            }
            Ok(*self.counts.get(namespace).unwrap_or(&0))
        }
    }

    fn load_with_bundle(bundle: &str, topics: u64, sessions: u64) -> (String, BrokerLoadData) {
        let mut load = BrokerLoadData::new();
        load.bundles.insert(bundle.to_string());
        load.last_stats.insert(
            bundle.to_string(),
            BundleStats {
                topics,
                producer_count: sessions,
                consumer_count: 0,
                msg_throughput_in: 0.0,
                msg_throughput_out: 0.0,
            },
        );
        ("broker-1".to_string(), load)
    }

    fn config() -> BalancerConfig {
        let mut config = BalancerConfig::default();
        config.load_balancer_namespace_bundle_max_topics = 100;
        config.load_balancer_namespace_bundle_max_sessions = 50;
        config.load_balancer_namespace_bundle_max_msg_rate = 1000.0;
        config.load_balancer_namespace_bundle_max_bandwidth_mbytes = 100.0;
        config.load_balancer_namespace_maximum_bundles = 128;
        config
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_topic_overflow_triggers_split() {
        let loads = vec![load_with_bundle("ns1/0x00_0x80", 500, 1)];
        let bundle_loads = InMemoryLoadStore::new();
        let namespaces = StaticNamespaces::new(&[("ns1", 8)]);

        let split = BundleSplitStrategy::new()
            .find_bundles_to_split(&loads, &bundle_loads, &namespaces, &config(), TIMEOUT)
            .await;
        assert!(split.contains("ns1/0x00_0x80"));
        assert_eq!(split.len(), 1);
    }

    #[tokio::test]
    async fn test_namespace_cap_excludes_bundle() {
        let loads = vec![load_with_bundle("ns1/0x00_0x80", 500, 1)];
        let bundle_loads = InMemoryLoadStore::new();
        let namespaces = StaticNamespaces::new(&[("ns1", 128)]);

        let split = BundleSplitStrategy::new()
            .find_bundles_to_split(&loads, &bundle_loads, &namespaces, &config(), TIMEOUT)
            .await;
        assert!(split.is_empty());
    }

    #[tokio::test]
    async fn test_single_topic_bundle_is_never_split() {
        // Over every other limit, but one topic cannot be divided
        let loads = vec![load_with_bundle("ns1/0x00_0x80", 1, 500)];
        let bundle_loads = InMemoryLoadStore::new();
        let namespaces = StaticNamespaces::new(&[("ns1", 0)]);

        let split = BundleSplitStrategy::new()
            .find_bundles_to_split(&loads, &bundle_loads, &namespaces, &config(), TIMEOUT)
            .await;
        assert!(split.is_empty());
    }

    #[tokio::test]
    async fn test_session_trigger_respects_disable_sentinel() {
        let loads = vec![load_with_bundle("ns1/0x00_0x80", 10, 5000)];
        let bundle_loads = InMemoryLoadStore::new();
        let namespaces = StaticNamespaces::new(&[("ns1", 0)]);

        let mut enabled = config();
        let split = BundleSplitStrategy::new()
            .find_bundles_to_split(&loads, &bundle_loads, &namespaces, &enabled, TIMEOUT)
            .await;
        assert_eq!(split.len(), 1);

        // Sessions trigger disabled with 0
        enabled.load_balancer_namespace_bundle_max_sessions = 0;
        let split = BundleSplitStrategy::new()
            .find_bundles_to_split(&loads, &bundle_loads, &namespaces, &enabled, TIMEOUT)
            .await;
        assert!(split.is_empty());
    }

    #[tokio::test]
    async fn test_long_term_rate_triggers_split() {
        let bundle = "ns1/0x00_0x80";
        let loads = vec![load_with_bundle(bundle, 10, 1)];
        let bundle_loads = InMemoryLoadStore::new();
        let mut data = BundleData::new();
        data.update(5000.0, 10.0);
        bundle_loads.push(bundle, data).unwrap();
        let namespaces = StaticNamespaces::new(&[("ns1", 8)]);

        let split = BundleSplitStrategy::new()
            .find_bundles_to_split(&loads, &bundle_loads, &namespaces, &config(), TIMEOUT)
            .await;
        assert!(split.contains(bundle));
    }

    #[tokio::test]
    async fn test_missing_bundle_data_means_idle() {
        // No long-term record and small short-term stats: not a candidate
        let loads = vec![load_with_bundle("ns1/0x00_0x80", 10, 1)];
        let bundle_loads = InMemoryLoadStore::new();
        let namespaces = StaticNamespaces::new(&[("ns1", 8)]);

        let split = BundleSplitStrategy::new()
            .find_bundles_to_split(&loads, &bundle_loads, &namespaces, &config(), TIMEOUT)
            .await;
        assert!(split.is_empty());
    }

    #[tokio::test]
    async fn test_namespace_query_failure_skips_only_that_bundle() {
        let mut load = BrokerLoadData::new();
        for bundle in ["ns-bad/0x00_0x80", "ns-good/0x00_0x80"] {
            load.bundles.insert(bundle.to_string());
            load.last_stats.insert(
                bundle.to_string(),
                BundleStats {
                    topics: 500,
                    producer_count: 1,
                    consumer_count: 0,
                    msg_throughput_in: 0.0,
                    msg_throughput_out: 0.0,
                },
            );
        }
        let loads = vec![("broker-1".to_string(), load)];
        let bundle_loads = InMemoryLoadStore::new();
        let namespaces = StaticNamespaces::new(&[("ns-bad", 8), ("ns-good", 8)]);
        namespaces.fail_namespace("ns-bad");

        let split = BundleSplitStrategy::new()
            .find_bundles_to_split(&loads, &bundle_loads, &namespaces, &config(), TIMEOUT)
            .await;
        assert_eq!(split.len(), 1);
        assert!(split.contains("ns-good/0x00_0x80"));
    }

    #[tokio::test]
    async fn test_result_is_deduplicated_across_brokers() {
        // Stale stats can surface the same bundle under two brokers
        let bundle = "ns1/0x00_0x80";
        let loads = vec![
            load_with_bundle(bundle, 500, 1),
            load_with_bundle(bundle, 500, 1),
        ];
        let bundle_loads = InMemoryLoadStore::new();
        let namespaces = StaticNamespaces::new(&[("ns1", 8)]);

        let split = BundleSplitStrategy::new()
            .find_bundles_to_split(&loads, &bundle_loads, &namespaces, &config(), TIMEOUT)
            .await;
        assert_eq!(split.len(), 1);
    }
}
