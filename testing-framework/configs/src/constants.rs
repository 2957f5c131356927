use std::time::Duration;

/// Lowest budget handed to any single phase of a request.
pub const MIN_PHASE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Timeout applied to invoke/query requests that do not carry their own.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Reported completion time waits for the slowest commit listener.
pub const DEFAULT_LATENCY_THRESHOLD: f64 = 1.0;

pub const DEFAULT_VERIFY_PROPOSAL_RESPONSES: bool = true;

pub const DEFAULT_VERIFY_READ_WRITE_SETS: bool = true;

pub const DEFAULT_COUNT_QUERY_AS_LOAD: bool = true;

/// Settle delay after broadcasting channel creation transactions.
pub const DEFAULT_SLEEP_AFTER_CREATE_CHANNEL: Duration = Duration::from_millis(5000);

/// Settle delay after peers joined their channels.
pub const DEFAULT_SLEEP_AFTER_JOIN_CHANNEL: Duration = Duration::from_millis(3000);

/// Settle delay after chaincode instantiation.
pub const DEFAULT_SLEEP_AFTER_INSTANTIATE: Duration = Duration::from_millis(5000);

pub const DEFAULT_INSTANTIATE_PROPOSAL_TIMEOUT: Duration = Duration::from_secs(300);

pub const DEFAULT_INSTANTIATE_EVENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Function invoked on instantiate when the contract does not name one.
pub const DEFAULT_INIT_FUNCTION: &str = "init";

/// Interval between commit status polls of the HTTP gateway.
pub const DEFAULT_GATEWAY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default HTTP timeout for gateway calls that carry no request deadline.
pub const DEFAULT_GATEWAY_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
