use std::{collections::BTreeSet, fmt, str::FromStr, time::Duration};

use fabric_bench_env as bench_env;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use thiserror::Error;
use tracing::warn;

use crate::{
    constants::{
        DEFAULT_COUNT_QUERY_AS_LOAD, DEFAULT_LATENCY_THRESHOLD, DEFAULT_REQUEST_TIMEOUT,
        DEFAULT_VERIFY_PROPOSAL_RESPONSES, DEFAULT_VERIFY_READ_WRITE_SETS, MIN_PHASE_TIMEOUT,
    },
    timeouts,
};

/// How peers and orderers are picked when a request does not name them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancing {
    /// Fixed index derived from the worker ordinal.
    #[default]
    Client,
    /// Index advanced once per transaction.
    RoundRobin,
}

impl LoadBalancing {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::RoundRobin => "round-robin",
        }
    }
}

impl fmt::Display for LoadBalancing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown load balancing mode '{0}' (expected 'client' or 'round-robin')")]
pub struct UnknownLoadBalancing(pub String);

impl FromStr for LoadBalancing {
    type Err = UnknownLoadBalancing;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "round-robin" | "roundrobin" | "transaction" => Ok(Self::RoundRobin),
            other => Err(UnknownLoadBalancing(other.to_owned())),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("latency threshold must be within (0, 1], got {0}")]
    LatencyThreshold(f64),
    #[error("minimal phase timeout must be > 0")]
    ZeroPhaseTimeout,
}

/// Tunables of the connector engine.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorSettings {
    pub verify_proposal_responses: bool,
    pub verify_read_write_sets: bool,
    pub latency_threshold: f64,
    pub load_balancing: LoadBalancing,
    pub count_query_as_load: bool,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub default_request_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub min_phase_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub sleep_after_create_channel: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub sleep_after_join_channel: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub sleep_after_instantiate: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub instantiate_proposal_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub instantiate_event_timeout: Duration,
    pub skip_create_channels: BTreeSet<String>,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            verify_proposal_responses: DEFAULT_VERIFY_PROPOSAL_RESPONSES,
            verify_read_write_sets: DEFAULT_VERIFY_READ_WRITE_SETS,
            latency_threshold: DEFAULT_LATENCY_THRESHOLD,
            load_balancing: LoadBalancing::default(),
            count_query_as_load: DEFAULT_COUNT_QUERY_AS_LOAD,
            default_request_timeout: DEFAULT_REQUEST_TIMEOUT,
            min_phase_timeout: MIN_PHASE_TIMEOUT,
            sleep_after_create_channel: timeouts::sleep_after_create_channel(),
            sleep_after_join_channel: timeouts::sleep_after_join_channel(),
            sleep_after_instantiate: timeouts::sleep_after_instantiate(),
            instantiate_proposal_timeout: timeouts::instantiate_proposal_timeout(),
            instantiate_event_timeout: timeouts::instantiate_event_timeout(),
            skip_create_channels: BTreeSet::new(),
        }
    }
}

impl ConnectorSettings {
    /// Applies `FABRIC_BENCH_*` overrides on top of the loaded values.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(threshold) = bench_env::fabric_bench_latency_threshold() {
            self.latency_threshold = threshold;
        }
        if let Some(mode) = bench_env::fabric_bench_load_balancing() {
            match mode.parse() {
                Ok(mode) => self.load_balancing = mode,
                Err(err) => warn!(%err, "ignoring load balancing override"),
            }
        }
        if let Some(verify) = bench_env::fabric_bench_verify_proposal_responses() {
            self.verify_proposal_responses = verify;
        }
        if let Some(verify) = bench_env::fabric_bench_verify_read_write_sets() {
            self.verify_read_write_sets = verify;
        }
        if let Some(count) = bench_env::fabric_bench_count_query_as_load() {
            self.count_query_as_load = count;
        }
        self
    }

    #[must_use]
    pub const fn with_latency_threshold(mut self, threshold: f64) -> Self {
        self.latency_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_load_balancing(mut self, mode: LoadBalancing) -> Self {
        self.load_balancing = mode;
        self
    }

    #[must_use]
    pub const fn with_read_write_set_check(mut self, enabled: bool) -> Self {
        self.verify_read_write_sets = enabled;
        self
    }

    #[must_use]
    pub const fn with_proposal_verification(mut self, enabled: bool) -> Self {
        self.verify_proposal_responses = enabled;
        self
    }

    /// Zeroes every settle delay, handy for in-process networks.
    #[must_use]
    pub const fn without_settle_delays(mut self) -> Self {
        self.sleep_after_create_channel = Duration::ZERO;
        self.sleep_after_join_channel = Duration::ZERO;
        self.sleep_after_instantiate = Duration::ZERO;
        self
    }

    #[must_use]
    pub fn skips_channel_creation(&self, channel: &str) -> bool {
        self.skip_create_channels.contains(channel)
            || bench_env::fabric_bench_skip_create_channel(channel)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.latency_threshold > 0.0 && self.latency_threshold <= 1.0) {
            return Err(SettingsError::LatencyThreshold(self.latency_threshold));
        }
        if self.min_phase_timeout.is_zero() {
            return Err(SettingsError::ZeroPhaseTimeout);
        }
        Ok(())
    }
}
