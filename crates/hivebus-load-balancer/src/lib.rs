/// Hivebus extensible load balancer: shedding and split decision engine
///
/// A fleet of brokers each owns a disjoint set of namespace bundles; the
/// elected leader periodically reduces cluster telemetry to two decisions:
/// which bundles to unload from overloaded brokers, and which bundles to
/// split so the unit of placement stays granular enough to redistribute.
///
/// This crate owns the decision engine only. Leader election, the broker
/// registry, the admin endpoint, and namespace metadata are consumed through
/// the traits in [`cluster`].

pub mod balancer;
pub mod cluster;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod scheduler;
pub mod strategies;
pub mod throttle;

// Re-export the main public API
pub use balancer::BundleBalancer;
pub use cluster::{
    split_bundle_id, AdminClient, BrokerRegistry, ClusterContext, LeaderElection,
    NamespaceService, PlacementStrategy,
};
pub use config::{BalancerConfig, ConfigError};
pub use cooldown::CooldownTracker;
pub use error::{AdminError, BalancerError};
pub use scheduler::{SheddingScheduler, SplitScheduler};
pub use strategies::{
    split::BundleSplitStrategy, threshold::ThresholdShedder, ShedContext, Unload, UnloadStrategy,
    UnloadStrategyKind,
};
