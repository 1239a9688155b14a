pub mod cache;
pub mod service;

pub use cache::PredictionCache;
pub use service::PredictionService;
