pub mod retraining;
pub mod tracker;

pub use retraining::{RetrainingOrchestrator, RetrainingRequest, RetrainingResult};
pub use tracker::{JobTracker, ProgressStream};
