pub mod split;
pub mod threshold;

use hivebus_load_data::BrokerLoadData;
use serde::{Deserialize, Serialize};

use crate::config::BalancerConfig;
use crate::cooldown::CooldownTracker;
use crate::error::BalancerError;
use self::threshold::ThresholdShedder;

/// A single (broker, bundle) unload proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unload {
    pub broker: String,
    pub bundle: String,
}

/// Inputs handed to every unload strategy on a tick
///
/// Strategies receive the full context explicitly; there is no opaque
/// context object to downcast.
pub struct ShedContext<'a> {
    /// Broker load snapshot, ordered by broker id for the tick
    pub loads: &'a [(String, BrokerLoadData)],
    pub recently_unloaded: &'a CooldownTracker,
    pub config: &'a BalancerConfig,
}

/// Common trait all unload strategies in the pipeline implement
pub trait UnloadStrategy: Send + Sync {
    /// Propose bundles to unload, ordered by victim priority per broker
    fn find_bundles_to_unload(&mut self, ctx: &ShedContext<'_>) -> Vec<Unload>;

    /// Name of this strategy for logging
    fn name(&self) -> &'static str;
}

/// Tag selecting a concrete unload strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnloadStrategyKind {
    Threshold,
}

impl UnloadStrategyKind {
    pub fn from_name(name: &str) -> Result<Self, BalancerError> {
        match name {
            "threshold" => Ok(UnloadStrategyKind::Threshold),
            other => Err(BalancerError::InvalidContext(format!(
                "unknown unload strategy '{}'",
                other
            ))),
        }
    }

    pub fn build(self) -> Box<dyn UnloadStrategy> {
        match self {
            UnloadStrategyKind::Threshold => Box::new(ThresholdShedder::new()),
        }
    }
}
