// Leakage-safe feature extraction
pub mod features;

// Background jobs: single-flight tracking and retraining
pub mod jobs;

// Training, calibration, artifacts and the active model
pub mod ml;

// Cached per-event predictions
pub mod prediction;

// Wagering backtests and threshold sweeps
pub mod simulation;
