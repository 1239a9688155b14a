//! Configuration module for podium.
//!
//! Structured configuration loaded from environment variables, organised by
//! concern: model storage, training, prediction cache, simulation and
//! progress streaming. Unparseable values fall back to their defaults.

mod model_config;
mod progress_config;
mod simulation_config;
mod training_config;

pub use model_config::ModelEnvConfig;
pub use progress_config::ProgressEnvConfig;
pub use simulation_config::{SimulationEnvConfig, load_sweep_grid, parse_sweep_grid};
pub use training_config::TrainingEnvConfig;

use crate::application::prediction::cache::DEFAULT_TTL_SECS;
use std::env;
use std::str::FromStr;

/// Key source for configuration values; `from_env` reads the process environment.
pub type Lookup = dyn Fn(&str) -> Option<String>;

fn parse_or<T: FromStr>(get: &Lookup, key: &str, default: T) -> T {
    get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct CacheEnvConfig {
    pub ttl_secs: i64,
}

impl Default for CacheEnvConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl CacheEnvConfig {
    fn from_lookup(get: &Lookup) -> Self {
        Self {
            ttl_secs: parse_or(get, "PREDICTION_CACHE_TTL_SECS", DEFAULT_TTL_SECS).max(1),
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs)
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub model: ModelEnvConfig,
    pub training: TrainingEnvConfig,
    pub cache: CacheEnvConfig,
    pub simulation: SimulationEnvConfig,
    pub progress: ProgressEnvConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(&|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key source.
    pub fn from_lookup(get: &Lookup) -> Self {
        Self {
            model: ModelEnvConfig::from_lookup(get),
            training: TrainingEnvConfig::from_lookup(get),
            cache: CacheEnvConfig::from_lookup(get),
            simulation: SimulationEnvConfig::from_lookup(get),
            progress: ProgressEnvConfig::from_lookup(get),
        }
    }
}
