/// Engine configuration
/// Field names serialize to the broker's `loadBalancer*` configuration keys
/// verbatim (including the historical `Bandwith` spelling); the same keys are
/// honored as environment variables by `from_env`.

use hivebus_load_data::ResourceWeights;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("malformed value for {key}: {message}")]
    Malformed { key: &'static str, message: String },
}

/// Load-balancer engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BalancerConfig {
    /// Master switch for the whole engine
    pub load_balancer_enabled: bool,
    /// Enables the shedding pipeline
    pub load_balancer_shedding_enabled: bool,
    /// Enables the bundle-split scheduler
    pub load_balancer_auto_bundle_split_enabled: bool,
    /// Percent over the fleet average at which a broker is overloaded
    pub load_balancer_broker_threshold_shedder_percentage: f64,
    /// EWMA weight of history vs. the current sample, in [0, 1]
    pub load_balancer_history_resource_percentage: f64,
    /// Minimum MB/s a shedding action must plan to move
    pub load_balancer_bundle_unload_min_throughput_threshold: f64,
    /// Cooldown between successive unloads of the same bundle
    pub load_balancer_shedding_grace_period_minutes: u64,
    #[serde(rename = "loadBalancerCPUResourceWeight")]
    pub load_balancer_cpu_resource_weight: f64,
    pub load_balancer_memory_resource_weight: f64,
    pub load_balancer_direct_memory_resource_weight: f64,
    pub load_balancer_bandwith_in_resource_weight: f64,
    pub load_balancer_bandwith_out_resource_weight: f64,
    /// Cap on bundles per namespace before splits are refused
    pub load_balancer_namespace_maximum_bundles: u32,
    pub load_balancer_namespace_bundle_max_topics: u64,
    /// 0 disables the session trigger
    pub load_balancer_namespace_bundle_max_sessions: u64,
    pub load_balancer_namespace_bundle_max_msg_rate: f64,
    pub load_balancer_namespace_bundle_max_bandwidth_mbytes: f64,
    /// Shedding tick period
    pub load_balancer_shedding_interval_seconds: u64,
    /// Split tick period (usually slower than shedding)
    pub load_balancer_split_interval_seconds: u64,
    /// Per-RPC deadline inside a tick
    pub load_balancer_rpc_timeout_seconds: u64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        BalancerConfig {
            load_balancer_enabled: true,
            load_balancer_shedding_enabled: true,
            load_balancer_auto_bundle_split_enabled: true,
            load_balancer_broker_threshold_shedder_percentage: 10.0,
            load_balancer_history_resource_percentage: 0.9,
            load_balancer_bundle_unload_min_throughput_threshold: 10.0,
            load_balancer_shedding_grace_period_minutes: 30,
            load_balancer_cpu_resource_weight: 1.0,
            load_balancer_memory_resource_weight: 1.0,
            load_balancer_direct_memory_resource_weight: 1.0,
            load_balancer_bandwith_in_resource_weight: 1.0,
            load_balancer_bandwith_out_resource_weight: 1.0,
            load_balancer_namespace_maximum_bundles: 128,
            load_balancer_namespace_bundle_max_topics: 1000,
            load_balancer_namespace_bundle_max_sessions: 1000,
            load_balancer_namespace_bundle_max_msg_rate: 30_000.0,
            load_balancer_namespace_bundle_max_bandwidth_mbytes: 100.0,
            load_balancer_shedding_interval_seconds: 60,
            load_balancer_split_interval_seconds: 180,
            load_balancer_rpc_timeout_seconds: 10,
        }
    }
}

impl BalancerConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = BalancerConfig::default();

        env_bool("loadBalancerEnabled", &mut config.load_balancer_enabled)?;
        env_bool(
            "loadBalancerSheddingEnabled",
            &mut config.load_balancer_shedding_enabled,
        )?;
        env_bool(
            "loadBalancerAutoBundleSplitEnabled",
            &mut config.load_balancer_auto_bundle_split_enabled,
        )?;
        env_f64(
            "loadBalancerBrokerThresholdShedderPercentage",
            &mut config.load_balancer_broker_threshold_shedder_percentage,
        )?;
        env_f64(
            "loadBalancerHistoryResourcePercentage",
            &mut config.load_balancer_history_resource_percentage,
        )?;
        env_f64(
            "loadBalancerBundleUnloadMinThroughputThreshold",
            &mut config.load_balancer_bundle_unload_min_throughput_threshold,
        )?;
        env_u64(
            "loadBalancerSheddingGracePeriodMinutes",
            &mut config.load_balancer_shedding_grace_period_minutes,
        )?;
        env_f64(
            "loadBalancerCPUResourceWeight",
            &mut config.load_balancer_cpu_resource_weight,
        )?;
        env_f64(
            "loadBalancerMemoryResourceWeight",
            &mut config.load_balancer_memory_resource_weight,
        )?;
        env_f64(
            "loadBalancerDirectMemoryResourceWeight",
            &mut config.load_balancer_direct_memory_resource_weight,
        )?;
        env_f64(
            "loadBalancerBandwithInResourceWeight",
            &mut config.load_balancer_bandwith_in_resource_weight,
        )?;
        env_f64(
            "loadBalancerBandwithOutResourceWeight",
            &mut config.load_balancer_bandwith_out_resource_weight,
        )?;
        env_u32(
            "loadBalancerNamespaceMaximumBundles",
            &mut config.load_balancer_namespace_maximum_bundles,
        )?;
        env_u64(
            "loadBalancerNamespaceBundleMaxTopics",
            &mut config.load_balancer_namespace_bundle_max_topics,
        )?;
        env_u64(
            "loadBalancerNamespaceBundleMaxSessions",
            &mut config.load_balancer_namespace_bundle_max_sessions,
        )?;
        env_f64(
            "loadBalancerNamespaceBundleMaxMsgRate",
            &mut config.load_balancer_namespace_bundle_max_msg_rate,
        )?;
        env_f64(
            "loadBalancerNamespaceBundleMaxBandwidthMbytes",
            &mut config.load_balancer_namespace_bundle_max_bandwidth_mbytes,
        )?;
        env_u64(
            "loadBalancerSheddingIntervalSeconds",
            &mut config.load_balancer_shedding_interval_seconds,
        )?;
        env_u64(
            "loadBalancerSplitIntervalSeconds",
            &mut config.load_balancer_split_interval_seconds,
        )?;
        env_u64(
            "loadBalancerRpcTimeoutSeconds",
            &mut config.load_balancer_rpc_timeout_seconds,
        )?;

        config.validate()?;
        info!(
            shedding_enabled = config.load_balancer_shedding_enabled,
            threshold_pct = config.load_balancer_broker_threshold_shedder_percentage,
            grace_minutes = config.load_balancer_shedding_grace_period_minutes,
            "Balancer configuration loaded"
        );
        Ok(config)
    }

    /// Parse configuration from a JSON document with `loadBalancer*` keys
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: BalancerConfig =
            serde_json::from_str(raw).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with; soft misconfigurations
    /// (all-zero weights) only warn because the pipeline degrades to an empty plan
    pub fn validate(&self) -> Result<(), ConfigError> {
        let history = self.load_balancer_history_resource_percentage;
        if !(0.0..=1.0).contains(&history) {
            return Err(ConfigError::Invalid(format!(
                "loadBalancerHistoryResourcePercentage must be within [0, 1], got {}",
                history
            )));
        }
        if self.load_balancer_broker_threshold_shedder_percentage < 0.0 {
            return Err(ConfigError::Invalid(
                "loadBalancerBrokerThresholdShedderPercentage must be non-negative".to_string(),
            ));
        }
        if self.load_balancer_bundle_unload_min_throughput_threshold < 0.0 {
            return Err(ConfigError::Invalid(
                "loadBalancerBundleUnloadMinThroughputThreshold must be non-negative".to_string(),
            ));
        }
        let weights = self.resource_weights();
        for (name, weight) in [
            ("loadBalancerCPUResourceWeight", weights.cpu),
            ("loadBalancerMemoryResourceWeight", weights.memory),
            ("loadBalancerDirectMemoryResourceWeight", weights.direct_memory),
            ("loadBalancerBandwithInResourceWeight", weights.bandwidth_in),
            ("loadBalancerBandwithOutResourceWeight", weights.bandwidth_out),
        ] {
            if weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be non-negative, got {}",
                    name, weight
                )));
            }
        }
        if weights.sum() == 0.0 {
            warn!("all resource weights are zero; the shedder will never see load");
        }
        if self.load_balancer_shedding_interval_seconds == 0
            || self.load_balancer_split_interval_seconds == 0
        {
            return Err(ConfigError::Invalid(
                "scheduler intervals must be non-zero".to_string(),
            ));
        }
        if self.load_balancer_rpc_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "loadBalancerRpcTimeoutSeconds must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn resource_weights(&self) -> ResourceWeights {
        ResourceWeights {
            cpu: self.load_balancer_cpu_resource_weight,
            memory: self.load_balancer_memory_resource_weight,
            direct_memory: self.load_balancer_direct_memory_resource_weight,
            bandwidth_in: self.load_balancer_bandwith_in_resource_weight,
            bandwidth_out: self.load_balancer_bandwith_out_resource_weight,
        }
    }

    /// Overload margin as a fraction (configured percentage / 100)
    pub fn threshold_fraction(&self) -> f64 {
        self.load_balancer_broker_threshold_shedder_percentage / 100.0
    }

    /// Minimum planned offload in bytes/s for a shedding action to proceed
    pub fn min_unload_bytes(&self) -> f64 {
        self.load_balancer_bundle_unload_min_throughput_threshold * BYTES_PER_MB
    }

    /// Split trigger on long-term bundle throughput, in bytes/s
    pub fn max_bundle_bandwidth_bytes(&self) -> f64 {
        self.load_balancer_namespace_bundle_max_bandwidth_mbytes * BYTES_PER_MB
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.load_balancer_shedding_grace_period_minutes * 60)
    }

    pub fn shedding_interval(&self) -> Duration {
        Duration::from_secs(self.load_balancer_shedding_interval_seconds)
    }

    pub fn split_interval(&self) -> Duration {
        Duration::from_secs(self.load_balancer_split_interval_seconds)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.load_balancer_rpc_timeout_seconds)
    }
}

fn env_f64(key: &'static str, slot: &mut f64) -> Result<(), ConfigError> {
    if let Ok(raw) = env::var(key) {
        *slot = raw.parse::<f64>().map_err(|e| ConfigError::Malformed {
            key,
            message: e.to_string(),
        })?;
    }
    Ok(())
}

fn env_u64(key: &'static str, slot: &mut u64) -> Result<(), ConfigError> {
    if let Ok(raw) = env::var(key) {
        *slot = raw.parse::<u64>().map_err(|e| ConfigError::Malformed {
            key,
            message: e.to_string(),
        })?;
    }
    Ok(())
}

fn env_u32(key: &'static str, slot: &mut u32) -> Result<(), ConfigError> {
    if let Ok(raw) = env::var(key) {
        *slot = raw.parse::<u32>().map_err(|e| ConfigError::Malformed {
            key,
            message: e.to_string(),
        })?;
    }
    Ok(())
}

fn env_bool(key: &'static str, slot: &mut bool) -> Result<(), ConfigError> {
    if let Ok(raw) = env::var(key) {
        *slot = raw.parse::<bool>().map_err(|e| ConfigError::Malformed {
            key,
            message: e.to_string(),
        })?;
    }
    Ok(())
}
