use std::{env, path::PathBuf};

#[must_use]
pub fn debug_tracing() -> bool {
    env::var("FABRIC_BENCH_TRACING").is_ok_and(|val| val.eq_ignore_ascii_case("true"))
}

#[must_use]
pub fn fabric_bench_log() -> Option<String> {
    env::var("FABRIC_BENCH_LOG").ok()
}

#[must_use]
pub fn rust_log() -> Option<String> {
    env::var("RUST_LOG").ok()
}

#[must_use]
pub fn fabric_bench_network_config() -> Option<PathBuf> {
    env::var("FABRIC_BENCH_NETWORK_CONFIG").ok().map(PathBuf::from)
}

#[must_use]
pub fn fabric_bench_gateway_url() -> Option<String> {
    env::var("FABRIC_BENCH_GATEWAY_URL").ok()
}

#[must_use]
pub fn fabric_bench_latency_threshold() -> Option<f64> {
    env::var("FABRIC_BENCH_LATENCY_THRESHOLD")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
}

#[must_use]
pub fn fabric_bench_load_balancing() -> Option<String> {
    env::var("FABRIC_BENCH_LOAD_BALANCING").ok()
}

#[must_use]
pub fn fabric_bench_verify_proposal_responses() -> Option<bool> {
    env::var("FABRIC_BENCH_VERIFY_PROPOSAL_RESPONSES")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
}

#[must_use]
pub fn fabric_bench_verify_read_write_sets() -> Option<bool> {
    env::var("FABRIC_BENCH_VERIFY_READ_WRITE_SETS")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
}

#[must_use]
pub fn fabric_bench_count_query_as_load() -> Option<bool> {
    env::var("FABRIC_BENCH_COUNT_QUERY_AS_LOAD")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
}

/// Channels whose creation is skipped, e.g. `FABRIC_BENCH_SKIP_CREATE_CHANNEL_MYCHANNEL=true`.
#[must_use]
pub fn fabric_bench_skip_create_channel(channel: &str) -> bool {
    let key = format!(
        "FABRIC_BENCH_SKIP_CREATE_CHANNEL_{}",
        channel.to_ascii_uppercase().replace(['-', '.'], "_")
    );
    env::var(key).is_ok_and(|val| val.eq_ignore_ascii_case("true"))
}
