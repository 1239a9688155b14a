// Bet evaluation for a single event
pub mod betting;

// Backtests over a date window
pub mod simulator;

// EV threshold sweeps as background jobs
pub mod sweep;

pub use betting::{evaluate_event, pair_odds, pair_probability};
pub use simulator::{PreparedBatch, PreparedEvent, Simulator, simulate};
pub use sweep::{SweepOrchestrator, SweepRequest, run_sweep, sharpe_ratio};
