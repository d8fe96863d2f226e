//! Query performance tracking: rolling latency windows, slow-query capture and cache hit rate

use crate::models::config::MonitorConfig;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// Metric name used for every planner execution
pub const SEARCH_METRIC: &str = "search.execute";

/// One planner execution, as observed by the monitor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSample {
    pub query_fingerprint: String,
    pub execution_time_ms: u64,
    pub was_cache_hit: bool,
    /// Epoch milliseconds
    pub timestamp: i64,
}

/// Statistics over the retained window of a metric
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricStats {
    pub name: String,
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

/// A measurement above the slow-query threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlowQuery {
    pub name: String,
    pub duration_ms: u64,
    pub query: Option<serde_json::Value>,
    pub timestamp: i64,
}

/// Aggregated view for dashboards and logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_queries: u64,
    pub cache_hit_rate: f64,
    pub metrics: Vec<MetricStats>,
    pub slow_query_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PerformanceAlertType {
    LowHitRate,
    SlowAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub alert_type: PerformanceAlertType,
    pub message: String,
    pub severity: AlertSeverity,
    pub current_value: f64,
    pub threshold_value: f64,
}

#[derive(Debug, Default)]
struct HitRate {
    rate: f64,
    total: u64,
}

/// Performance monitor shared by every search
pub struct PerformanceMonitor {
    windows: RwLock<HashMap<String, VecDeque<u64>>>,
    slow_queries: Mutex<VecDeque<SlowQuery>>,
    recent_samples: Mutex<VecDeque<PerformanceSample>>,
    hit_rate: Mutex<HitRate>,
    config: MonitorConfig,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            slow_queries: Mutex::new(VecDeque::new()),
            recent_samples: Mutex::new(VecDeque::new()),
            hit_rate: Mutex::new(HitRate::default()),
            config,
        }
    }

    /// Record a duration for a named metric
    pub fn record(&self, name: &str, duration_ms: u64) {
        self.record_with_query(name, duration_ms, None);
    }

    /// Record a duration, keeping the triggering query if it turns out slow
    pub fn record_with_query(&self, name: &str, duration_ms: u64, query: Option<serde_json::Value>) {
        {
            let mut windows = self.windows.write();
            // Only a metric's first sample allocates its name
            match windows.get_mut(name) {
                Some(window) => {
                    window.push_back(duration_ms);
                    while window.len() > self.config.window_size {
                        window.pop_front();
                    }
                }
                None => {
                    windows.insert(name.to_string(), VecDeque::from([duration_ms]));
                }
            }
        }

        if duration_ms > self.config.slow_query_threshold_ms {
            warn!(
                metric = name,
                duration_ms = duration_ms,
                threshold_ms = self.config.slow_query_threshold_ms,
                "Slow query detected"
            );
            let mut slow = self.slow_queries.lock();
            slow.push_back(SlowQuery {
                name: name.to_string(),
                duration_ms,
                query,
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
            while slow.len() > self.config.max_slow_queries {
                slow.pop_front();
            }
        }
    }

    /// Record a planner execution: latency window, slow list and hit rate
    pub fn record_sample(&self, sample: PerformanceSample, query: Option<serde_json::Value>) {
        debug!(
            fingerprint = %sample.query_fingerprint,
            duration_ms = sample.execution_time_ms,
            cache_hit = sample.was_cache_hit,
            "Recording search sample"
        );

        self.record_with_query(SEARCH_METRIC, sample.execution_time_ms, query);

        {
            // Running weighted fraction, updated incrementally
            let mut hit_rate = self.hit_rate.lock();
            hit_rate.total += 1;
            let observed = if sample.was_cache_hit { 1.0 } else { 0.0 };
            hit_rate.rate += (observed - hit_rate.rate) / hit_rate.total as f64;
        }

        let mut recent = self.recent_samples.lock();
        recent.push_back(sample);
        while recent.len() > self.config.window_size {
            recent.pop_front();
        }
    }

    /// Stats over the retained window; None if the metric was never recorded
    pub fn stats(&self, name: &str) -> Option<MetricStats> {
        let windows = self.windows.read();
        let window = windows.get(name)?;
        Self::compute_stats(name, window)
    }

    fn compute_stats(name: &str, window: &VecDeque<u64>) -> Option<MetricStats> {
        if window.is_empty() {
            return None;
        }
        let sum: u64 = window.iter().sum();
        Some(MetricStats {
            name: name.to_string(),
            count: window.len(),
            avg_ms: sum as f64 / window.len() as f64,
            min_ms: window.iter().copied().min().unwrap_or(0),
            max_ms: window.iter().copied().max().unwrap_or(0),
        })
    }

    /// Slow queries, oldest first
    pub fn slow_queries(&self) -> Vec<SlowQuery> {
        self.slow_queries.lock().iter().cloned().collect()
    }

    /// Most recent planner samples, oldest first
    pub fn recent_samples(&self) -> Vec<PerformanceSample> {
        self.recent_samples.lock().iter().cloned().collect()
    }

    pub fn cache_hit_rate(&self) -> f64 {
        self.hit_rate.lock().rate
    }

    pub fn total_queries(&self) -> u64 {
        self.hit_rate.lock().total
    }

    pub fn report(&self) -> PerformanceReport {
        let mut metrics: Vec<MetricStats> = {
            let windows = self.windows.read();
            windows
                .iter()
                .filter_map(|(name, window)| Self::compute_stats(name, window))
                .collect()
        };
        metrics.sort_by(|a, b| a.name.cmp(&b.name));

        let hit_rate = self.hit_rate.lock();
        PerformanceReport {
            total_queries: hit_rate.total,
            cache_hit_rate: hit_rate.rate,
            metrics,
            slow_query_count: self.slow_queries.lock().len(),
        }
    }

    /// Check whether the current numbers warrant an alert
    pub fn check_alerts(&self) -> Vec<PerformanceAlert> {
        let report = self.report();
        let mut alerts = Vec::new();

        if report.total_queries > 10 && report.cache_hit_rate < self.config.min_hit_rate {
            alerts.push(PerformanceAlert {
                alert_type: PerformanceAlertType::LowHitRate,
                message: format!(
                    "Search cache hit rate ({:.2}%) is below threshold ({:.2}%)",
                    report.cache_hit_rate * 100.0,
                    self.config.min_hit_rate * 100.0
                ),
                severity: AlertSeverity::Warning,
                current_value: report.cache_hit_rate,
                threshold_value: self.config.min_hit_rate,
            });
        }

        let threshold = self.config.slow_query_threshold_ms as f64;
        for metric in report.metrics.iter().filter(|m| m.avg_ms > threshold) {
            alerts.push(PerformanceAlert {
                alert_type: PerformanceAlertType::SlowAverage,
                message: format!(
                    "Average latency of '{}' ({:.2}ms) exceeds threshold ({:.2}ms)",
                    metric.name, metric.avg_ms, threshold
                ),
                severity: AlertSeverity::Critical,
                current_value: metric.avg_ms,
                threshold_value: threshold,
            });
        }

        alerts
    }

    pub fn reset(&self) {
        self.windows.write().clear();
        self.slow_queries.lock().clear();
        self.recent_samples.lock().clear();
        *self.hit_rate.lock() = HitRate::default();
    }
}
