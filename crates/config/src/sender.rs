use serde::{Deserialize, Serialize};

/// Configuration for the chain-IO tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EthioConfig {
    pub gas: GasConfig,
    pub dispatcher: DispatcherConfig,
    pub watcher: WatcherConfig,
}

/// Configuration for the gas price adjuster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GasConfig {
    /// Lowest price the adjuster will ever quote, in wei.
    pub floor: u64,
    /// Highest price the adjuster will ever quote, in wei.
    pub ceiling: u64,
    /// Max multiplicative movement of the estimate per update tick.
    pub scale_factor: f64,
    /// How often to read a price sample from the chain, in ms.
    pub sample_interval_ms: u64,
    /// How often to recompute the live estimate, in ms.
    pub update_interval_ms: u64,
    /// Age past which a sample falls out of the window, in ms.
    pub sample_window_ms: u64,
}

/// Configuration for the dispatch engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatcherConfig {
    /// Hard bound on concurrently live attempts.
    pub max_in_flight: usize,
    /// How often to invoke the dispatcher, in ms.
    pub dispatch_interval_ms: u64,
    /// Resubmissions allowed per operation before giving up.
    pub max_resubmissions: u32,
}

/// Configuration for the confirmation watcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatcherConfig {
    /// How often to poll the chain for attempt status, in ms.
    pub poll_interval_ms: u64,
    /// Blocks on top of the inclusion block before an attempt counts as
    /// confirmed.
    pub confirmation_depth: u64,
    /// How long an attempt may stay unincluded before it counts as stuck, in
    /// ms.
    pub expected_wait_ms: u64,
}

/// Configuration for the proof-worker pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProverPoolConfig {
    /// Silence past which an assigned worker is declared gone, in ms.
    pub heartbeat_timeout_ms: u64,
    /// How often to invoke the liveness check, in ms.
    pub tick_interval_ms: u64,
    /// Max prepared-but-unassigned jobs held at once.
    pub job_capacity: usize,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            floor: 1_000_000_000,
            ceiling: 500_000_000_000,
            scale_factor: 1.5,
            sample_interval_ms: 5_000,
            update_interval_ms: 15_000,
            sample_window_ms: 120_000,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            dispatch_interval_ms: 1_000,
            max_resubmissions: 5,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            confirmation_depth: 6,
            expected_wait_ms: 300_000,
        }
    }
}

impl Default for ProverPoolConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: 60_000,
            tick_interval_ms: 10_000,
            job_capacity: 32,
        }
    }
}
