//! Operator configuration. Consumed by the engine tasks, owned by whoever
//! loads it (the client binary, tests).

pub mod config;
pub mod sender;

pub use config::{ClientConfig, Config, L1RpcConfig};
pub use sender::{DispatcherConfig, EthioConfig, GasConfig, ProverPoolConfig, WatcherConfig};
