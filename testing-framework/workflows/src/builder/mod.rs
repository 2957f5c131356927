use std::{num::NonZeroUsize, time::Duration};

use fabric_bench_core::{FabricRequest, scenario::Builder as CoreScenarioBuilder};

use crate::{expectations::SuccessRateExpectation, workloads::transaction::TransactionWorkload};

#[derive(Debug, thiserror::Error)]
pub enum BuilderInputError {
    #[error("{field} must be non-zero")]
    ZeroValue { field: &'static str },
    #[error("{field} must be a positive finite number, got {value}")]
    NotPositive { field: &'static str, value: f64 },
}

/// Extension methods for building benchmark rounds with common patterns.
pub trait ScenarioBuilderExt: Sized {
    /// Configure a transaction flow workload.
    fn transactions(self) -> TransactionFlowBuilder;

    /// Configure a transaction flow workload via closure.
    fn transactions_with(
        self,
        f: impl FnOnce(TransactionFlowBuilder) -> TransactionFlowBuilder,
    ) -> CoreScenarioBuilder;

    #[must_use]
    /// Attach a success rate expectation over every recorded request.
    fn expect_success_rate(self, min_ratio: f64) -> Self;

    #[must_use]
    /// Round duration in whole seconds.
    fn with_run_duration_secs(self, secs: u64) -> Self;
}

impl ScenarioBuilderExt for CoreScenarioBuilder {
    fn transactions(self) -> TransactionFlowBuilder {
        TransactionFlowBuilder::new(self)
    }

    fn transactions_with(
        self,
        f: impl FnOnce(TransactionFlowBuilder) -> TransactionFlowBuilder,
    ) -> CoreScenarioBuilder {
        f(self.transactions()).apply()
    }

    fn expect_success_rate(self, min_ratio: f64) -> Self {
        self.with_expectation(SuccessRateExpectation::new(min_ratio))
    }

    fn with_run_duration_secs(self, secs: u64) -> Self {
        self.with_run_duration(Duration::from_secs(secs))
    }
}

pub struct TransactionFlowBuilder {
    builder: CoreScenarioBuilder,
    template: FabricRequest,
    count: NonZeroUsize,
    rate: Option<f64>,
}

impl TransactionFlowBuilder {
    fn new(builder: CoreScenarioBuilder) -> Self {
        Self {
            builder,
            template: FabricRequest::default(),
            count: NonZeroUsize::MIN,
            rate: None,
        }
    }

    #[must_use]
    /// Request every submission is cloned from.
    pub fn request(mut self, template: FabricRequest) -> Self {
        self.template = template;
        self
    }

    #[must_use]
    /// Number of requests to issue (ignores zero).
    pub fn count(mut self, count: usize) -> Self {
        match NonZeroUsize::new(count) {
            Some(count) => self.count = count,
            None => tracing::warn!(
                count,
                "transaction count must be non-zero; keeping previous count"
            ),
        }
        self
    }

    /// Like `count`, but returns an error instead of ignoring zero.
    pub fn try_count(mut self, count: usize) -> Result<Self, BuilderInputError> {
        let Some(count) = NonZeroUsize::new(count) else {
            return Err(BuilderInputError::ZeroValue {
                field: "transaction_count",
            });
        };
        self.count = count;
        Ok(self)
    }

    #[must_use]
    /// Requests per second (ignores non-positive values).
    pub fn rate(mut self, rate: f64) -> Self {
        if rate.is_finite() && rate > 0.0 {
            self.rate = Some(rate);
        } else {
            tracing::warn!(rate, "transaction rate must be positive; keeping previous rate");
        }
        self
    }

    /// Like `rate`, but returns an error instead of ignoring bad values.
    pub fn try_rate(mut self, rate: f64) -> Result<Self, BuilderInputError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(BuilderInputError::NotPositive {
                field: "transaction_rate",
                value: rate,
            });
        }
        self.rate = Some(rate);
        Ok(self)
    }

    #[must_use]
    /// Attach the transaction workload to the round.
    pub fn apply(mut self) -> CoreScenarioBuilder {
        tracing::info!(
            contract = self.template.contract_id.as_deref(),
            function = self.template.contract_function.as_deref(),
            count = self.count.get(),
            rate = self.rate,
            "attaching transaction workload"
        );

        let mut workload = TransactionWorkload::new(self.template, self.count);
        if let Some(rate) = self.rate {
            workload = workload.with_rate(rate);
        }

        self.builder = self.builder.with_workload(workload);
        self.builder
    }
}
