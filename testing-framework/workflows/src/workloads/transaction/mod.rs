mod workload;

pub use workload::{INDEX_PLACEHOLDER, TransactionWorkload};
