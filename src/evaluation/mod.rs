//! Prediction assembly and grouped evaluation

pub mod grouped;
pub mod predictions;
pub mod time_bucket;

pub use grouped::{aggregate, aggregate_by_datetime, GroupedMetricsAggregator};
pub use predictions::{PredictionsAssembler, Split, TEST_SET, TRAIN_SET, VALIDATION_SET};
pub use time_bucket::{bucket, parse_timestamp, with_time_bucket, Frequency};
