mod success_rate;

pub use success_rate::SuccessRateExpectation;
