//! Prometheus metrics for the prediction and training pipeline
//!
//! All metrics use the `podium_` prefix and live in a private registry.

use crate::domain::jobs::JobKind;
use chrono::{DateTime, Utc};
use prometheus::{
    CounterVec, Gauge, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Prometheus metrics for the pipeline
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Arc<Registry>,
    /// Cache lookups by outcome (hit/miss)
    pub cache_lookups_total: IntCounterVec,
    /// Served predictions by source (model/baseline)
    pub predictions_total: IntCounterVec,
    /// Finished jobs by kind and outcome
    pub job_runs_total: CounterVec,
    /// Wall-clock job duration in seconds
    pub job_duration_seconds: HistogramVec,
    /// Unix timestamp of the active model's creation, 0 when none
    pub active_model_created: Gauge,
}

impl PipelineMetrics {
    /// Create a new instance with all counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cache_lookups_total = IntCounterVec::new(
            Opts::new("podium_cache_lookups_total", "Prediction cache lookups by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(cache_lookups_total.clone()))?;

        let predictions_total = IntCounterVec::new(
            Opts::new("podium_predictions_total", "Event predictions served by source"),
            &["source"],
        )?;
        registry.register(Box::new(predictions_total.clone()))?;

        let job_runs_total = CounterVec::new(
            Opts::new("podium_job_runs_total", "Finished background jobs by kind and outcome"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(job_runs_total.clone()))?;

        let job_duration_seconds = HistogramVec::new(
            HistogramOpts::new("podium_job_duration_seconds", "Background job duration in seconds")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
            &["kind"],
        )?;
        registry.register(Box::new(job_duration_seconds.clone()))?;

        let active_model_created = Gauge::with_opts(Opts::new(
            "podium_active_model_created_timestamp",
            "Creation time of the active model (unix seconds)",
        ))?;
        registry.register(Box::new(active_model_created.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            cache_lookups_total,
            predictions_total,
            job_runs_total,
            job_duration_seconds,
            active_model_created,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn record_cache(&self, hit: bool) {
        let outcome = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_prediction(&self, source: &str) {
        self.predictions_total.with_label_values(&[source]).inc();
    }

    pub fn record_job(&self, kind: JobKind, success: bool, duration_secs: f64) {
        let kind = kind.to_string();
        let outcome = if success { "completed" } else { "failed" };
        self.job_runs_total
            .with_label_values(&[kind.as_str(), outcome])
            .inc();
        self.job_duration_seconds
            .with_label_values(&[kind.as_str()])
            .observe(duration_secs.max(0.0));
    }

    pub fn set_active_model(&self, created_at: DateTime<Utc>) {
        self.active_model_created.set(created_at.timestamp() as f64);
    }
}
