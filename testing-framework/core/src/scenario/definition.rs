use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, info};

use super::{DynError, expectation::Expectation, runtime::context::RunMetrics, workload::Workload};

const MIN_ROUND_DURATION: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ScenarioBuildError {
    #[error("scenario has no workloads")]
    NoWorkloads,
    #[error("workload '{name}' failed to initialize")]
    WorkloadInit { name: String, source: DynError },
    #[error("expectation '{name}' failed to initialize")]
    ExpectationInit { name: String, source: DynError },
}

/// Immutable round definition shared between the runner, workloads, and
/// expectations.
pub struct Scenario {
    workloads: Vec<Arc<dyn Workload>>,
    expectations: Vec<Box<dyn Expectation>>,
    duration: Duration,
}

impl Scenario {
    #[must_use]
    pub fn workloads(&self) -> &[Arc<dyn Workload>] {
        &self.workloads
    }

    #[must_use]
    pub fn expectations(&self) -> &[Box<dyn Expectation>] {
        &self.expectations
    }

    #[must_use]
    pub fn expectations_mut(&mut self) -> &mut [Box<dyn Expectation>] {
        &mut self.expectations
    }

    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub const fn run_metrics(&self) -> RunMetrics {
        RunMetrics::new(self.duration)
    }
}

/// Builder used by callers to describe the round.
#[derive(Default)]
pub struct Builder {
    workloads: Vec<Box<dyn Workload>>,
    expectations: Vec<Box<dyn Expectation>>,
    duration: Duration,
}

pub type ScenarioBuilder = Builder;

impl Builder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_workload<W>(mut self, workload: W) -> Self
    where
        W: Workload + 'static,
    {
        self.expectations.extend(workload.expectations());
        self.workloads.push(Box::new(workload));
        self
    }

    #[must_use]
    /// Add a standalone expectation not tied to a workload.
    pub fn with_expectation<E>(mut self, expectation: E) -> Self
    where
        E: Expectation + 'static,
    {
        self.expectations.push(Box::new(expectation));
        self
    }

    #[must_use]
    /// Upper bound on how long workloads may run.
    pub const fn with_run_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Finalize the round, initializing every component.
    pub fn build(self) -> Result<Scenario, ScenarioBuildError> {
        let Self {
            mut workloads,
            mut expectations,
            duration,
        } = self;

        if workloads.is_empty() {
            return Err(ScenarioBuildError::NoWorkloads);
        }

        let duration = duration.max(MIN_ROUND_DURATION);
        let run_metrics = RunMetrics::new(duration);
        initialize_workloads(&run_metrics, &mut workloads)?;
        initialize_expectations(&run_metrics, &mut expectations)?;
        let workloads: Vec<Arc<dyn Workload>> = workloads.into_iter().map(Arc::from).collect();

        info!(
            duration_secs = duration.as_secs(),
            workloads = workloads.len(),
            expectations = expectations.len(),
            "scenario built"
        );

        Ok(Scenario {
            workloads,
            expectations,
            duration,
        })
    }
}

fn initialize_workloads(
    run_metrics: &RunMetrics,
    workloads: &mut [Box<dyn Workload>],
) -> Result<(), ScenarioBuildError> {
    for workload in workloads {
        debug!(workload = workload.name(), "initializing workload");
        workload
            .init(run_metrics)
            .map_err(|source| ScenarioBuildError::WorkloadInit {
                name: workload.name().to_owned(),
                source,
            })?;
    }
    Ok(())
}

fn initialize_expectations(
    run_metrics: &RunMetrics,
    expectations: &mut [Box<dyn Expectation>],
) -> Result<(), ScenarioBuildError> {
    for expectation in expectations {
        debug!(expectation = expectation.name(), "initializing expectation");
        expectation
            .init(run_metrics)
            .map_err(|source| ScenarioBuildError::ExpectationInit {
                name: expectation.name().to_owned(),
                source,
            })?;
    }
    Ok(())
}
