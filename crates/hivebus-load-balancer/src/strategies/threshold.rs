/// Threshold shedder
/// Smooths each broker's weighted resource usage across ticks, flags brokers
/// above the fleet average by the configured margin, and greedily picks their
/// highest-throughput bundles until enough traffic is marked to move.

use hivebus_load_data::weighted_max_usage;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::strategies::{ShedContext, Unload, UnloadStrategy};
use crate::throttle::{LogThrottle, DEFAULT_LOG_INTERVAL};

/// Aim this far below the overload line when sizing the offload target
const OFFLOAD_MARGIN: f64 = 0.05;

pub struct ThresholdShedder {
    /// EWMA of weighted usage per broker; persists across ticks and may
    /// briefly keep entries for brokers that have left the cluster
    smoothed: HashMap<String, f64>,
    sanitation_log: LogThrottle,
}

impl ThresholdShedder {
    pub fn new() -> Self {
        ThresholdShedder {
            smoothed: HashMap::new(),
            sanitation_log: LogThrottle::new(DEFAULT_LOG_INTERVAL),
        }
    }

    /// Smoothed usage currently recorded for a broker
    pub fn smoothed_usage(&self, broker: &str) -> Option<f64> {
        self.smoothed.get(broker).copied()
    }

    /// Fold the tick's samples into the smoothed map and return the fleet average
    fn update_smoothed(&mut self, ctx: &ShedContext<'_>) -> f64 {
        let weights = ctx.config.resource_weights();
        let history = ctx.config.load_balancer_history_resource_percentage;

        let mut total = 0.0;
        let mut count = 0usize;
        for (broker, load) in ctx.loads {
            let usage = weighted_max_usage(load, &weights);
            if usage.is_sanitized() && self.sanitation_log.ready() {
                error!(
                    broker = %broker,
                    saturated = ?usage.saturated,
                    "resource usage above 100%, excluding saturated signals from the average"
                );
            }
            let updated = match self.smoothed.get(broker.as_str()) {
                Some(previous) => previous * history + (1.0 - history) * usage.value,
                None => usage.value,
            };
            self.smoothed.insert(broker.clone(), updated);
            total += updated;
            count += 1;
        }

        if count > 0 {
            total / count as f64
        } else {
            0.0
        }
    }
}

impl Default for ThresholdShedder {
    fn default() -> Self {
        Self::new()
    }
}

impl UnloadStrategy for ThresholdShedder {
    fn find_bundles_to_unload(&mut self, ctx: &ShedContext<'_>) -> Vec<Unload> {
        let avg = self.update_smoothed(ctx);
        if avg == 0.0 {
            warn!("average weighted usage is zero, nothing to shed");
            return Vec::new();
        }

        let threshold = ctx.config.threshold_fraction();
        let min_unload_bytes = ctx.config.min_unload_bytes();
        let mut unloads = Vec::new();

        for (broker, load) in ctx.loads {
            let current = self.smoothed.get(broker.as_str()).copied().unwrap_or(0.0);
            if current < avg + threshold {
                continue;
            }

            let offload_fraction = current - avg - threshold + OFFLOAD_MARGIN;
            let broker_throughput = load.total_throughput();
            let target_bytes = broker_throughput * offload_fraction;
            if target_bytes < min_unload_bytes {
                info!(
                    broker = %broker,
                    target_bytes = target_bytes,
                    min_bytes = min_unload_bytes,
                    "planned offload below the minimum throughput threshold, skipping"
                );
                continue;
            }

            if load.bundles.is_empty() {
                warn!(broker = %broker, usage = current, "broker is overloaded but owns no bundles");
                continue;
            }
            if load.bundles.len() == 1 {
                warn!(
                    broker = %broker,
                    usage = current,
                    "HIGH USAGE WARNING: broker owns a single bundle, only a split can relieve it"
                );
                continue;
            }

            let mut candidates: Vec<(&str, f64)> = load
                .last_stats
                .iter()
                .filter(|(bundle, _)| !ctx.recently_unloaded.is_cooling(bundle))
                .filter(|(bundle, _)| load.bundles.contains(*bundle))
                .map(|(bundle, stats)| (bundle.as_str(), stats.total_throughput()))
                .collect();
            candidates
                .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

            let mut marked_bytes = 0.0;
            let mut selected_any = false;
            for (bundle, throughput) in candidates {
                // Keep taking bundles until enough traffic is marked; always
                // take at least one surviving candidate so a broker with
                // underreported telemetry still makes progress
                if marked_bytes < target_bytes || !selected_any {
                    unloads.push(Unload {
                        broker: broker.clone(),
                        bundle: bundle.to_string(),
                    });
                    marked_bytes += throughput;
                    selected_any = true;
                }
            }

            if selected_any {
                info!(
                    broker = %broker,
                    usage = current,
                    avg = avg,
                    target_bytes = target_bytes,
                    marked_bytes = marked_bytes,
                    "selected bundles to offload"
                );
            }
        }

        unloads
    }

    fn name(&self) -> &'static str {
        "threshold"
    }
}
