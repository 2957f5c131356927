//! Round orchestration: workloads drive the connector, expectations judge
//! the recorded transaction statuses.

mod definition;
mod expectation;
pub mod runtime;
mod workload;

pub use definition::{Builder, Scenario, ScenarioBuildError, ScenarioBuilder};
pub use expectation::Expectation;
pub use runtime::{
    context::{RunContext, RunMetrics, RunSummary},
    runner::{Runner, ScenarioError},
};
pub use workload::Workload;

/// Error type used by workloads and expectations.
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;
