use std::{env, time::Duration};

use crate::constants::{
    DEFAULT_INSTANTIATE_EVENT_TIMEOUT, DEFAULT_INSTANTIATE_PROPOSAL_TIMEOUT,
    DEFAULT_SLEEP_AFTER_CREATE_CHANNEL, DEFAULT_SLEEP_AFTER_INSTANTIATE,
    DEFAULT_SLEEP_AFTER_JOIN_CHANNEL,
};

fn env_duration(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

pub fn sleep_after_create_channel() -> Duration {
    env_duration(
        "FABRIC_BENCH_SLEEP_AFTER_CREATE_CHANNEL_MS",
        DEFAULT_SLEEP_AFTER_CREATE_CHANNEL,
    )
}

pub fn sleep_after_join_channel() -> Duration {
    env_duration(
        "FABRIC_BENCH_SLEEP_AFTER_JOIN_CHANNEL_MS",
        DEFAULT_SLEEP_AFTER_JOIN_CHANNEL,
    )
}

pub fn sleep_after_instantiate() -> Duration {
    env_duration(
        "FABRIC_BENCH_SLEEP_AFTER_INSTANTIATE_MS",
        DEFAULT_SLEEP_AFTER_INSTANTIATE,
    )
}

pub fn instantiate_proposal_timeout() -> Duration {
    env_duration(
        "FABRIC_BENCH_INSTANTIATE_TIMEOUT_MS",
        DEFAULT_INSTANTIATE_PROPOSAL_TIMEOUT,
    )
}

pub fn instantiate_event_timeout() -> Duration {
    env_duration(
        "FABRIC_BENCH_INSTANTIATE_EVENT_TIMEOUT_MS",
        DEFAULT_INSTANTIATE_EVENT_TIMEOUT,
    )
}
