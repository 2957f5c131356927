use std::sync::LazyLock;

use fabric_bench_env as bench_env;

pub mod constants;
pub mod network;
pub mod settings;
pub mod timeouts;

pub use network::{ConfigError, NetworkConfig};
pub use settings::{ConnectorSettings, LoadBalancing};

pub static IS_DEBUG_TRACING: LazyLock<bool> = LazyLock::new(bench_env::debug_tracing);
