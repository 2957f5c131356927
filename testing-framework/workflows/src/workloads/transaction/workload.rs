use std::{num::NonZeroUsize, time::Duration};

use async_trait::async_trait;
use fabric_bench_core::{
    FabricRequest,
    scenario::{DynError, Expectation, RunContext, RunMetrics, Workload as ScenarioWorkload},
};
use tokio::time::sleep;

use crate::expectations::SuccessRateExpectation;

/// Argument token replaced with the request's sequence number.
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// Submission timing plan for the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SubmissionPlan {
    transaction_count: usize,
    submission_interval: Duration,
}

/// Issues a fixed number of requests built from a template.
#[derive(Clone)]
pub struct TransactionWorkload {
    template: FabricRequest,
    count: NonZeroUsize,
    rate_per_sec: Option<f64>,
    min_success_ratio: Option<f64>,
    plan: Option<SubmissionPlan>,
}

#[async_trait]
impl ScenarioWorkload for TransactionWorkload {
    fn name(&self) -> &str {
        "fabric_tx_workload"
    }

    fn expectations(&self) -> Vec<Box<dyn Expectation>> {
        self.min_success_ratio
            .map(|ratio| Box::new(SuccessRateExpectation::new(ratio)) as Box<dyn Expectation>)
            .into_iter()
            .collect()
    }

    fn init(&mut self, run_metrics: &RunMetrics) -> Result<(), DynError> {
        if self.template.contract_id.is_none() {
            return Err("transaction workload requires a contract id".into());
        }
        if let Some(rate) = self.rate_per_sec {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(format!("transaction workload rate must be positive, got {rate}").into());
            }
        }

        let plan = submission_plan(self.count, self.rate_per_sec, run_metrics.run_duration());
        tracing::info!(
            planned = plan.transaction_count,
            interval_ms = plan.submission_interval.as_millis(),
            read_only = self.template.read_only,
            "transaction workload submission plan"
        );
        self.plan = Some(plan);
        Ok(())
    }

    async fn start(&self, ctx: &RunContext) -> Result<(), DynError> {
        let plan = self
            .plan
            .ok_or("transaction workload started before initialization")?;

        tracing::info!(
            total = plan.transaction_count,
            interval_ms = plan.submission_interval.as_millis(),
            "begin transaction submissions"
        );

        for index in 0..plan.transaction_count {
            let request = self.request(index);
            let status = ctx.connector().send_request(&request).await?;
            tracing::debug!(
                tx_id = %status.id(),
                status = ?status.status(),
                "transaction finished"
            );
            ctx.record(status);

            if !plan.submission_interval.is_zero() {
                sleep(plan.submission_interval).await;
            }
        }

        tracing::info!("transaction submissions finished");
        Ok(())
    }
}

impl TransactionWorkload {
    #[must_use]
    pub const fn new(template: FabricRequest, count: NonZeroUsize) -> Self {
        Self {
            template,
            count,
            rate_per_sec: None,
            min_success_ratio: None,
            plan: None,
        }
    }

    /// Spaces submissions to roughly `rate` requests per second.
    #[must_use]
    pub const fn with_rate(mut self, rate: f64) -> Self {
        self.rate_per_sec = Some(rate);
        self
    }

    /// Attaches a [`SuccessRateExpectation`] with the given minimum ratio.
    #[must_use]
    pub const fn with_min_success_ratio(mut self, ratio: f64) -> Self {
        self.min_success_ratio = Some(ratio);
        self
    }

    #[must_use]
    pub const fn template(&self) -> &FabricRequest {
        &self.template
    }

    #[must_use]
    pub const fn count(&self) -> NonZeroUsize {
        self.count
    }

    fn request(&self, index: usize) -> FabricRequest {
        let mut request = self.template.clone();
        if let Some(arguments) = request.contract_arguments.as_mut() {
            for argument in arguments.iter_mut() {
                if argument.contains(INDEX_PLACEHOLDER) {
                    *argument = argument.replace(INDEX_PLACEHOLDER, &index.to_string());
                }
            }
        }
        request
    }
}

/// Without a rate, requests are spread evenly over the round, one per second
/// at most apart.
fn submission_plan(count: NonZeroUsize, rate: Option<f64>, run_duration: Duration) -> SubmissionPlan {
    const MAX_SUBMISSION_INTERVAL: Duration = Duration::from_secs(1);

    let transaction_count = count.get();
    let submission_interval = match rate {
        Some(rate) => Duration::from_secs_f64(1.0 / rate),
        None => (run_duration / u32::try_from(transaction_count).unwrap_or(u32::MAX))
            .min(MAX_SUBMISSION_INTERVAL),
    };

    SubmissionPlan {
        transaction_count,
        submission_interval,
    }
}
