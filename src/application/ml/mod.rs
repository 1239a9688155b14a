pub mod baseline;
pub mod boosting;
pub mod calibration;
pub mod dataset;
pub mod evaluation;
pub mod model_registry;
pub mod predictor;
pub mod scaler;

pub use baseline::market_baseline;
pub use boosting::BoostingParams;
pub use dataset::{Dataset, SplitPlan};
pub use model_registry::ModelRegistry;
pub use predictor::{FeatureImportance, TrainedModel, TrainingConfig, TrainingMetrics, train};
