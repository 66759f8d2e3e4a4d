/// Leader-gated periodic schedulers
/// One tick pipeline for shedding, one for splitting. Both run only on the
/// leader, skip sparse clusters, and coalesce ticks that would overlap.

use arc_swap::ArcSwap;
use hivebus_load_data::{BrokerLoadData, LoadDataStore, StoreError};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cluster::{split_bundle_id, ClusterContext};
use crate::config::BalancerConfig;
use crate::cooldown::CooldownTracker;
use crate::strategies::split::BundleSplitStrategy;
use crate::strategies::{ShedContext, Unload, UnloadStrategy, UnloadStrategyKind};
use crate::throttle::{LogThrottle, DEFAULT_LOG_INTERVAL};

/// Gate checks shared by both schedulers, in contract order
///
/// Returns the visible broker set when the tick may proceed.
fn tick_gates(
    context: &ClusterContext,
    config: &BalancerConfig,
    feature_enabled: bool,
    scheduler: &'static str,
) -> Option<HashSet<String>> {
    if !config.load_balancer_enabled || !feature_enabled {
        return None;
    }
    if !context.is_leader() {
        debug!(scheduler, "not the leader, skipping tick");
        return None;
    }
    let brokers = context.registry.available_brokers();
    if brokers.len() < 2 {
        info!(
            scheduler,
            brokers = brokers.len(),
            "fewer than two brokers visible, nothing to balance"
        );
        return None;
    }
    Some(brokers)
}

/// Consistent per-tick snapshot of the broker load store, ordered by broker id
fn snapshot_loads(
    store: &dyn LoadDataStore<BrokerLoadData>,
) -> Result<Vec<(String, BrokerLoadData)>, StoreError> {
    let mut loads = Vec::with_capacity(store.len());
    store.for_each(&mut |broker, data| loads.push((broker.to_string(), data.clone())))?;
    loads.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(loads)
}

/// Periodic shedding tick: runs the strategy pipeline and dispatches unloads
pub struct SheddingScheduler {
    context: Arc<ClusterContext>,
    config: Arc<ArcSwap<BalancerConfig>>,
    /// Strategy pipeline; also serves as the tick lock so overlapping ticks
    /// coalesce instead of queueing
    pipeline: Mutex<Vec<Box<dyn UnloadStrategy>>>,
    recently_unloaded: CooldownTracker,
    summary_log: LogThrottle,
}

impl SheddingScheduler {
    pub fn new(
        context: Arc<ClusterContext>,
        config: Arc<ArcSwap<BalancerConfig>>,
        strategies: &[UnloadStrategyKind],
    ) -> Self {
        let pipeline = strategies.iter().map(|kind| kind.build()).collect();
        SheddingScheduler {
            context,
            config,
            pipeline: Mutex::new(pipeline),
            recently_unloaded: CooldownTracker::new(),
            summary_log: LogThrottle::new(DEFAULT_LOG_INTERVAL),
        }
    }

    /// Bundles currently under cooldown
    pub fn cooling_count(&self) -> usize {
        self.recently_unloaded.len()
    }

    /// One shedding tick; safe to call from a fixed-delay timer
    pub async fn execute(&self) {
        let Ok(mut pipeline) = self.pipeline.try_lock() else {
            debug!("previous shedding tick still running, coalescing");
            return;
        };
        let config = self.config.load_full();
        let Some(_brokers) = tick_gates(
            &self.context,
            &config,
            config.load_balancer_shedding_enabled,
            "shedding",
        ) else {
            return;
        };

        self.recently_unloaded.purge_expired(config.grace_period());

        let loads = match snapshot_loads(self.context.broker_loads.as_ref()) {
            Ok(loads) => loads,
            Err(e) => {
                warn!(error = %e, "broker load store unavailable, skipping shedding tick");
                return;
            }
        };
        if self.summary_log.ready() {
            info!(
                brokers = loads.len(),
                cooling = self.recently_unloaded.len(),
                "shedding tick: evaluating cluster load"
            );
        }

        let shed_ctx = ShedContext {
            loads: &loads,
            recently_unloaded: &self.recently_unloaded,
            config: config.as_ref(),
        };
        let mut proposals: Vec<Unload> = Vec::new();
        for strategy in pipeline.iter_mut() {
            let picked = strategy.find_bundles_to_unload(&shed_ctx);
            debug!(
                strategy = strategy.name(),
                proposals = picked.len(),
                "strategy produced unload proposals"
            );
            proposals.extend(picked);
        }

        // Dispatch brokers concurrently, but keep each broker's unloads
        // sequential in victim-selection order
        let mut per_broker: Vec<(String, Vec<Unload>)> = Vec::new();
        for unload in proposals {
            match per_broker.iter_mut().find(|(broker, _)| *broker == unload.broker) {
                Some((_, unloads)) => unloads.push(unload),
                None => per_broker.push((unload.broker.clone(), vec![unload])),
            }
        }
        let config_ref = config.as_ref();
        let dispatches = per_broker.iter().map(|(_, unloads)| async move {
            for unload in unloads {
                self.dispatch_unload(config_ref, unload).await;
            }
        });
        futures::future::join_all(dispatches).await;
    }

    async fn dispatch_unload(&self, config: &BalancerConfig, unload: &Unload) {
        let (namespace, range) = match split_bundle_id(&unload.bundle) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(
                    broker = %unload.broker,
                    bundle = %unload.bundle,
                    error = %e,
                    "dropping unload proposal with malformed bundle id"
                );
                return;
            }
        };

        let call = self.context.admin.unload_namespace_bundle(namespace, range);
        match tokio::time::timeout(config.rpc_timeout(), call).await {
            Ok(Ok(())) => {
                info!(broker = %unload.broker, bundle = %unload.bundle, "bundle unloaded");
                self.recently_unloaded.mark(unload.bundle.clone());
            }
            Ok(Err(e)) => {
                // Not marked as unloaded so a later tick can retry
                warn!(
                    broker = %unload.broker,
                    bundle = %unload.bundle,
                    error = %e,
                    "bundle unload failed"
                );
            }
            Err(_) => {
                warn!(
                    broker = %unload.broker,
                    bundle = %unload.bundle,
                    timeout_secs = config.load_balancer_rpc_timeout_seconds,
                    "bundle unload timed out"
                );
            }
        }
    }
}

/// Periodic split tick: emits the set of bundles to split
///
/// Dispatching the actual split is owned by the namespace layer; consumers
/// subscribe via the `on_split` callback.
pub struct SplitScheduler {
    context: Arc<ClusterContext>,
    config: Arc<ArcSwap<BalancerConfig>>,
    strategy: BundleSplitStrategy,
    tick: Mutex<()>,
    on_split: Option<Box<dyn Fn(&HashSet<String>) + Send + Sync>>,
}

impl SplitScheduler {
    pub fn new(context: Arc<ClusterContext>, config: Arc<ArcSwap<BalancerConfig>>) -> Self {
        SplitScheduler {
            context,
            config,
            strategy: BundleSplitStrategy::new(),
            tick: Mutex::new(()),
            on_split: None,
        }
    }

    /// Register the consumer of emitted split sets
    pub fn set_on_split(&mut self, on_split: Box<dyn Fn(&HashSet<String>) + Send + Sync>) {
        self.on_split = Some(on_split);
    }

    /// One split tick; returns the emitted set
    pub async fn execute(&self) -> HashSet<String> {
        let Ok(_tick) = self.tick.try_lock() else {
            debug!("previous split tick still running, coalescing");
            return HashSet::new();
        };
        let config = self.config.load_full();
        let Some(_brokers) = tick_gates(
            &self.context,
            &config,
            config.load_balancer_auto_bundle_split_enabled,
            "split",
        ) else {
            return HashSet::new();
        };

        let loads = match snapshot_loads(self.context.broker_loads.as_ref()) {
            Ok(loads) => loads,
            Err(e) => {
                warn!(error = %e, "broker load store unavailable, skipping split tick");
                return HashSet::new();
            }
        };

        let bundles = self
            .strategy
            .find_bundles_to_split(
                &loads,
                self.context.bundle_loads.as_ref(),
                self.context.namespaces.as_ref(),
                &config,
                config.rpc_timeout(),
            )
            .await;
        if !bundles.is_empty() {
            info!(count = bundles.len(), "bundles flagged for split");
        }
        if let Some(on_split) = &self.on_split {
            on_split(&bundles);
        }
        bundles
    }
}
