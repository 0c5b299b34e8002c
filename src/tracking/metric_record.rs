//! Metric Record - time-series metrics for runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric Record represents a single metric data point.
///
/// Re-logging a key never overwrites: each call appends a new point whose
/// `step` is its position in log order for that `(run_id, key)`.
///
/// ## Time-Series Layout
///
/// Metrics are stored with:
/// - `run_id` + `key` as the partition key for efficient filtering
/// - `step` as the sort key for time-series ordering
/// - `timestamp` for wall-clock time correlation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    run_id: String,
    key: String,
    step: u64,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Create a new metric record stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `run_id` - ID of the parent run
    /// * `key` - Metric name/key (e.g., "accuracy", "rows_after")
    /// * `step` - Position of this point in the key's history
    /// * `value` - Metric value
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, step: u64, value: f64) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            step,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the metric key/name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the step number.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Get the metric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the timestamp when the metric was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_record_new() {
        let metric = MetricRecord::new("run-1", "rows_after", 0, 1800.0);
        assert_eq!(metric.run_id(), "run-1");
        assert_eq!(metric.key(), "rows_after");
        assert_eq!(metric.step(), 0);
        assert!((metric.value() - 1800.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metric_record_serialization() {
        let metric = MetricRecord::new("run-1", "f1_score", 2, 0.91);
        let json = serde_json::to_string(&metric).unwrap();
        let back: MetricRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(metric, back);
    }
}
