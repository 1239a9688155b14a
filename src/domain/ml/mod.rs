// Feature schema, missing-data outcomes and prediction payloads
pub mod feature_registry;
pub mod measured;
pub mod prediction;

pub use feature_registry::{FeatureVector, feature_count, feature_schema};
pub use measured::{Measured, NEUTRAL};
pub use prediction::{EntrantPrediction, EventPrediction, PredictionSource};
