use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt as _;
use thiserror::Error;
use tokio::{task::JoinSet, time::timeout};
use tracing::info;

use crate::{
    connector::{ConnectorError, FabricConnector},
    scenario::{
        DynError, Expectation, Scenario,
        runtime::context::{RunContext, RunSummary},
    },
    util::panic_message,
};

type WorkloadOutcome = Result<(), DynError>;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("connector context unavailable: {0}")]
    Connector(#[from] ConnectorError),
    #[error("workload failure: {0}")]
    Workload(#[source] DynError),
    #[error("expectation capture failed: {0}")]
    ExpectationCapture(#[source] DynError),
    #[error("expectations failed:\n{0}")]
    Expectations(#[source] DynError),
}

/// Drives one round against an acquired connector context.
pub struct Runner {
    connector: Arc<FabricConnector>,
    context: Arc<RunContext>,
}

impl Runner {
    /// Acquires the connector context for `round_index`.
    pub async fn prepare(
        connector: Arc<FabricConnector>,
        scenario: &Scenario,
        round_index: usize,
    ) -> Result<Self, ScenarioError> {
        let connector_context = connector.get_context(round_index).await?;
        let context = RunContext::new(
            Arc::clone(&connector),
            connector_context,
            scenario.run_metrics(),
        );
        Ok(Self {
            connector,
            context: Arc::new(context),
        })
    }

    #[must_use]
    pub fn context(&self) -> Arc<RunContext> {
        Arc::clone(&self.context)
    }

    /// Runs workloads, then evaluates every expectation. The connector
    /// context is released on every path.
    pub async fn run(self, scenario: &mut Scenario) -> Result<RunSummary, ScenarioError> {
        let outcome = self.drive(scenario).await;
        self.connector.release_context().await;

        let summary = outcome?;
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "round finished"
        );
        Ok(summary)
    }

    async fn drive(&self, scenario: &mut Scenario) -> Result<RunSummary, ScenarioError> {
        Self::prepare_expectations(scenario.expectations_mut(), &self.context).await?;
        Self::run_workloads(&self.context, scenario).await?;
        Self::run_expectations(scenario.expectations_mut(), &self.context).await?;
        Ok(self.context.summary())
    }

    async fn prepare_expectations(
        expectations: &mut [Box<dyn Expectation>],
        context: &RunContext,
    ) -> Result<(), ScenarioError> {
        for expectation in expectations {
            expectation
                .start_capture(context)
                .await
                .map_err(ScenarioError::ExpectationCapture)?;
        }
        Ok(())
    }

    /// Spawns every workload, waits until they finish or the round duration
    /// elapses, and then aborts the remaining tasks.
    async fn run_workloads(
        context: &Arc<RunContext>,
        scenario: &Scenario,
    ) -> Result<(), ScenarioError> {
        let mut workloads = Self::spawn_workloads(scenario, context);
        Self::drive_until_timer(&mut workloads, scenario.duration()).await?;
        Self::drain_workloads(&mut workloads).await
    }

    /// Evaluates every registered expectation, aggregating failures so callers
    /// can see all missing conditions in a single report.
    async fn run_expectations(
        expectations: &mut [Box<dyn Expectation>],
        context: &RunContext,
    ) -> Result<(), ScenarioError> {
        let mut failures: Vec<(String, DynError)> = Vec::new();
        for expectation in expectations {
            if let Err(source) = expectation.evaluate(context).await {
                failures.push((expectation.name().to_owned(), source));
            }
        }

        if failures.is_empty() {
            return Ok(());
        }

        let summary = failures
            .into_iter()
            .map(|(name, source)| format!("{name}: {source}"))
            .collect::<Vec<_>>()
            .join("\n");

        Err(ScenarioError::Expectations(summary.into()))
    }

    fn spawn_workloads(scenario: &Scenario, context: &Arc<RunContext>) -> JoinSet<WorkloadOutcome> {
        let mut workloads = JoinSet::new();
        for workload in scenario.workloads() {
            let workload = Arc::clone(workload);
            let ctx = Arc::clone(context);

            workloads.spawn(async move {
                let outcome = AssertUnwindSafe(async { workload.start(ctx.as_ref()).await })
                    .catch_unwind()
                    .await;

                outcome.unwrap_or_else(|panic| {
                    Err(format!("workload panicked: {}", panic_message(panic)).into())
                })
            });
        }

        workloads
    }

    /// Returns `true` when the timer fired before every workload finished.
    async fn drive_until_timer(
        workloads: &mut JoinSet<WorkloadOutcome>,
        duration: Duration,
    ) -> Result<bool, ScenarioError> {
        let run_future = async {
            while let Some(result) = workloads.join_next().await {
                Self::map_join_result(result)?;
            }
            Ok::<(), ScenarioError>(())
        };

        timeout(duration, run_future)
            .await
            .map_or(Ok(true), |result| {
                result?;
                Ok(false)
            })
    }

    async fn drain_workloads(workloads: &mut JoinSet<WorkloadOutcome>) -> Result<(), ScenarioError> {
        workloads.abort_all();

        while let Some(result) = workloads.join_next().await {
            Self::map_join_result(result)?;
        }

        Ok(())
    }

    /// Tolerates cancellation when the runner aborts unfinished tasks.
    fn map_join_result(
        result: Result<WorkloadOutcome, tokio::task::JoinError>,
    ) -> Result<(), ScenarioError> {
        match result {
            Ok(outcome) => outcome.map_err(ScenarioError::Workload),
            Err(join_err) if join_err.is_cancelled() => Ok(()),
            Err(join_err) => Err(ScenarioError::Workload(
                format!("workload task failed: {join_err}").into(),
            )),
        }
    }
}
