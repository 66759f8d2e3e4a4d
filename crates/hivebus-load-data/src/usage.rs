/// Weighted resource-usage evaluation
/// Reduces a broker's five resource signals to a single figure, excluding
/// signals that report above 100% of their limit so a misconfigured limit
/// cannot poison the fleet average.

use crate::broker::BrokerLoadData;
use serde::{Deserialize, Serialize};

/// Per-resource weights applied before taking the maximum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceWeights {
    pub cpu: f64,
    pub memory: f64,
    pub direct_memory: f64,
    pub bandwidth_in: f64,
    pub bandwidth_out: f64,
}

impl Default for ResourceWeights {
    fn default() -> Self {
        ResourceWeights {
            cpu: 1.0,
            memory: 1.0,
            direct_memory: 1.0,
            bandwidth_in: 1.0,
            bandwidth_out: 1.0,
        }
    }
}

impl ResourceWeights {
    pub fn sum(&self) -> f64 {
        self.cpu + self.memory + self.direct_memory + self.bandwidth_in + self.bandwidth_out
    }
}

/// Result of evaluating a broker's weighted usage
#[derive(Debug, Clone, Default)]
pub struct WeightedUsage {
    /// Weighted maximum over the usable (within-limit) signals
    pub value: f64,
    /// Names of resources reporting above 100% of their limit
    pub saturated: Vec<&'static str>,
}

impl WeightedUsage {
    pub fn is_sanitized(&self) -> bool {
        !self.saturated.is_empty()
    }
}

/// Weighted maximum of a broker's resource usages
///
/// Signals above 1.0 are recorded in `saturated` and excluded from the
/// maximum; when every signal is saturated the value degrades to 0.
pub fn weighted_max_usage(load: &BrokerLoadData, weights: &ResourceWeights) -> WeightedUsage {
    let signals = [
        ("cpu", load.cpu, weights.cpu),
        ("memory", load.memory, weights.memory),
        ("direct_memory", load.direct_memory, weights.direct_memory),
        ("bandwidth_in", load.bandwidth_in, weights.bandwidth_in),
        ("bandwidth_out", load.bandwidth_out, weights.bandwidth_out),
    ];

    let mut saturated = Vec::new();
    let mut max_within_limit = 0.0_f64;
    let mut max_overall = 0.0_f64;
    for (name, usage, weight) in signals {
        let weighted = usage * weight;
        max_overall = max_overall.max(weighted);
        if usage > 1.0 {
            saturated.push(name);
        } else {
            max_within_limit = max_within_limit.max(weighted);
        }
    }

    let value = if saturated.is_empty() {
        max_overall
    } else {
        max_within_limit
    };
    WeightedUsage { value, saturated }
}
