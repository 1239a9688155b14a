//! Pull-free observability for the pipeline
//!
//! Metrics are only ever exported as Prometheus text through
//! [`PipelineMetrics::gather`]; nothing here listens for requests.

pub mod metrics;

pub use metrics::PipelineMetrics;
