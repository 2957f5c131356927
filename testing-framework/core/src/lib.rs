pub mod clients;
pub mod clock;
pub mod connector;
pub mod deadline;
pub mod engine;
pub mod lifecycle;
pub mod network;
pub mod request;
pub mod scenario;
pub mod selector;
pub mod topology;
pub mod tx_status;
mod util;

pub use connector::{ConnectorContext, ConnectorError, FabricConnector, ProcessRole, TxStats};
pub use fabric_bench_config::IS_DEBUG_TRACING;
pub use request::FabricRequest;
pub use tx_status::{TxState, TxStatus};
