/// Engine facade
/// The surface the broker's load-manager adapter talks to: lifecycle,
/// manual ticks, and pass-throughs to the registry and placement strategy.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::cluster::{ClusterContext, PlacementStrategy};
use crate::config::BalancerConfig;
use crate::error::BalancerError;
use crate::scheduler::{SheddingScheduler, SplitScheduler};
use crate::strategies::UnloadStrategyKind;

/// Load-shedding and bundle-split engine for one broker
///
/// Both schedulers are spawned by [`start`](Self::start) and gate themselves
/// on leadership each tick, so the engine can run on every broker.
pub struct BundleBalancer {
    context: Arc<ClusterContext>,
    config: Arc<ArcSwap<BalancerConfig>>,
    shedding: Arc<SheddingScheduler>,
    splitting: Arc<SplitScheduler>,
    placement: Option<Arc<dyn PlacementStrategy>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BundleBalancer {
    /// Build the engine with the default strategy pipeline
    pub fn new(
        context: Arc<ClusterContext>,
        config: BalancerConfig,
    ) -> Result<Self, BalancerError> {
        Self::with_strategies(context, config, &[UnloadStrategyKind::Threshold])
    }

    /// Build the engine with an explicit unload-strategy pipeline
    pub fn with_strategies(
        context: Arc<ClusterContext>,
        config: BalancerConfig,
        strategies: &[UnloadStrategyKind],
    ) -> Result<Self, BalancerError> {
        config.validate()?;
        let config = Arc::new(ArcSwap::from_pointee(config));
        let shedding = Arc::new(SheddingScheduler::new(
            Arc::clone(&context),
            Arc::clone(&config),
            strategies,
        ));
        let splitting = Arc::new(SplitScheduler::new(
            Arc::clone(&context),
            Arc::clone(&config),
        ));
        let (shutdown, _) = watch::channel(false);

        Ok(BundleBalancer {
            context,
            config,
            shedding,
            splitting,
            placement: None,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Attach the sibling placement strategy used by `get_least_loaded`
    pub fn with_placement(mut self, placement: Arc<dyn PlacementStrategy>) -> Self {
        self.placement = Some(placement);
        self
    }

    /// Register a consumer for emitted split sets; call before `start`
    pub fn with_split_listener(
        mut self,
        listener: Box<dyn Fn(&HashSet<String>) + Send + Sync>,
    ) -> Self {
        if let Some(splitting) = Arc::get_mut(&mut self.splitting) {
            splitting.set_on_split(listener);
        } else {
            warn!("split listener registered after start, ignoring");
        }
        self
    }

    /// Spawn the shedding and split schedulers
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!("load balancer already started");
            return;
        }
        self.shutdown.send_replace(false);

        let shedding = Arc::clone(&self.shedding);
        let config = Arc::clone(&self.config);
        let rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = shedding_loop(shedding, config) => {}
                _ = wait_shutdown(rx) => {
                    info!("shedding scheduler stopped");
                }
            }
        }));

        let splitting = Arc::clone(&self.splitting);
        let config = Arc::clone(&self.config);
        let rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = split_loop(splitting, config) => {}
                _ = wait_shutdown(rx) => {
                    info!("split scheduler stopped");
                }
            }
        }));

        info!("load balancer schedulers started");
    }

    /// Stop both schedulers, abandoning any in-flight tick work
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        info!("load balancer stopped");
    }

    /// Run one shedding tick outside the timer
    pub async fn execute(&self) {
        self.shedding.execute().await;
    }

    /// Run one split tick outside the timer, returning the emitted set
    pub async fn execute_split(&self) -> HashSet<String> {
        self.splitting.execute().await
    }

    /// Legacy adapter hook; splits are driven by the split scheduler
    pub async fn do_namespace_bundle_split(&self) {}

    /// Brokers currently visible to the metadata layer
    pub fn get_available_brokers(&self) -> HashSet<String> {
        self.context.registry.available_brokers()
    }

    /// Delegate bundle placement to the configured sibling strategy
    pub fn get_least_loaded(&self, bundle: &str) -> Option<String> {
        let placement = self.placement.as_ref()?;
        placement.select_broker(bundle, &self.get_available_brokers())
    }

    /// Swap the configuration without restarting the schedulers
    pub fn update_config(&self, config: BalancerConfig) -> Result<(), BalancerError> {
        config.validate()?;
        self.config.store(Arc::new(config));
        Ok(())
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<BalancerConfig> {
        self.config.load_full()
    }
}

async fn shedding_loop(scheduler: Arc<SheddingScheduler>, config: Arc<ArcSwap<BalancerConfig>>) {
    let mut ticker = tokio::time::interval(config.load().shedding_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        scheduler.execute().await;
    }
}

async fn split_loop(scheduler: Arc<SplitScheduler>, config: Arc<ArcSwap<BalancerConfig>>) {
    let mut ticker = tokio::time::interval(config.load().split_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        scheduler.execute().await;
    }
}

async fn wait_shutdown(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone means the balancer was dropped
            return;
        }
    }
}
