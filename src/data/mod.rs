//! Data loading, object storage and feature engineering modules

pub mod csv_loader;
pub mod features;
pub mod storage;

// Re-export commonly used types
pub use csv_loader::{
    default_metadata, metrics_to_frame, read_frame, PredictionLoader, RecordMeta,
};
pub use features::{CategoryFill, CategoryImputer, ScheduleDateFeatures, MISSING_FILL};
pub use storage::{ObjectLocation, ObjectStore};
