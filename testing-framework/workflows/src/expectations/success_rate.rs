use async_trait::async_trait;
use fabric_bench_core::scenario::{DynError, Expectation, RunContext, RunSummary};
use thiserror::Error;

/// Checks that enough of the recorded requests finished successfully.
#[derive(Clone, Copy, Debug)]
pub struct SuccessRateExpectation {
    min_ratio: f64,
}

#[derive(Debug, Error)]
enum SuccessRateError {
    #[error("no requests were recorded during the round")]
    NoTransactions,
    #[error(
        "success ratio {observed:.3} below required {required:.3} ({succeeded}/{total} succeeded)"
    )]
    BelowThreshold {
        observed: f64,
        required: f64,
        succeeded: usize,
        total: usize,
    },
}

impl SuccessRateExpectation {
    /// Ratio is clamped to `0.0..=1.0`.
    #[must_use]
    pub fn new(min_ratio: f64) -> Self {
        Self {
            min_ratio: min_ratio.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub const fn min_ratio(&self) -> f64 {
        self.min_ratio
    }

    fn check(&self, summary: &RunSummary) -> Result<(), SuccessRateError> {
        let observed = summary
            .success_ratio()
            .ok_or(SuccessRateError::NoTransactions)?;

        if observed + f64::EPSILON < self.min_ratio {
            return Err(SuccessRateError::BelowThreshold {
                observed,
                required: self.min_ratio,
                succeeded: summary.succeeded,
                total: summary.total,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Expectation for SuccessRateExpectation {
    fn name(&self) -> &str {
        "success_rate"
    }

    async fn evaluate(&mut self, ctx: &RunContext) -> Result<(), DynError> {
        let summary = ctx.summary();
        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            required = self.min_ratio,
            "evaluating success rate"
        );
        self.check(&summary)?;
        Ok(())
    }
}
