use serde::{Deserialize, Serialize};

use crate::sender::{EthioConfig, ProverPoolConfig};

/// Default value for `rpc_timeout_ms` in [`L1RpcConfig`].
const DEFAULT_RPC_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(Default))]
pub struct ClientConfig {
    /// Account the operator signs and submits from.
    pub signer_account: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L1RpcConfig {
    /// Base chain JSON-RPC endpoint.
    pub rpc_url: String,

    /// Per-request timeout, in ms.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
}

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub client: ClientConfig,
    pub l1: L1RpcConfig,
    #[serde(default)]
    pub ethio: EthioConfig,
    #[serde(default)]
    pub prover_pool: ProverPoolConfig,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_load() {
        let config_string = r#"
            [client]
            signer_account = "0x00a329c0648769a73afac7f9381e08fb43dbea72"

            [l1]
            rpc_url = "http://localhost:8545"

            [ethio.gas]
            floor = 10
            ceiling = 1000
            scale_factor = 1.5
            sample_interval_ms = 1000
            update_interval_ms = 2000
            sample_window_ms = 30000

            [ethio.dispatcher]
            max_in_flight = 3
            dispatch_interval_ms = 500
            max_resubmissions = 4

            [ethio.watcher]
            poll_interval_ms = 1000
            confirmation_depth = 6
            expected_wait_ms = 60000

            [prover_pool]
            heartbeat_timeout_ms = 30000
            tick_interval_ms = 5000
            job_capacity = 16
        "#;

        let config = toml::from_str::<Config>(config_string);
        assert!(
            config.is_ok(),
            "should be able to load TOML config but got: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.ethio.dispatcher.max_in_flight, 3);
        assert_eq!(config.l1.rpc_timeout_ms, 10_000, "default should fill in");
    }

    #[test]
    fn test_sections_default_when_absent() {
        let config_string = r#"
            [client]
            signer_account = "0x00a329c0648769a73afac7f9381e08fb43dbea72"

            [l1]
            rpc_url = "http://localhost:8545"
        "#;

        let config = toml::from_str::<Config>(config_string).unwrap();
        assert_eq!(config.ethio.watcher.confirmation_depth, 6);
        assert_eq!(config.prover_pool.job_capacity, 32);
    }
}
