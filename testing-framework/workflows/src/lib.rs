pub mod builder;
pub mod expectations;
pub mod workloads;

pub use builder::{BuilderInputError, ScenarioBuilderExt, TransactionFlowBuilder};
pub use expectations::SuccessRateExpectation;
pub use workloads::transaction::{INDEX_PLACEHOLDER, TransactionWorkload};
