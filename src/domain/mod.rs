// Domain-specific error types
pub mod errors;

// Background job vocabulary
pub mod jobs;

// Feature schema and prediction payloads
pub mod ml;

// Port interfaces
pub mod ports;

// Events, entrants and settled history
pub mod racing;

// Wagering policy and backtest reports
pub mod simulation;
