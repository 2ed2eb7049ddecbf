//! # Application State Management
//!
//! Shared state handed to every HTTP handler and every media bridge actor.
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: many handlers and bridges hold a reference to the same data
//! - **RwLock**: config reads run in parallel; updates and counters take the write lock
//!
//! Locks are never held across an `.await`. A poisoned lock is recovered
//! rather than unwrapped, since every protected value is a plain counter or a
//! config snapshot that stays consistent even if a writer panicked mid-call.

use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// The application state shared across all handlers and call bridges.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (agent and bridge sections can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Process-wide counters
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters collected across HTTP requests and calls.
///
/// ## Why these metrics matter:
/// - **active_calls**: bridges currently holding a telephony socket (capacity planning)
/// - **total_calls**: bridges created since start
/// - **failed_calls**: bridges abandoned because the agent never became ready
/// - **endpoint_metrics**: per-endpoint HTTP statistics
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of HTTP errors since server start
    pub error_count: u64,

    /// Media bridges currently alive
    pub active_calls: u32,

    /// Media bridges created since server start
    pub total_calls: u64,

    /// Media bridges that failed to reach the agent
    pub failed_calls: u64,

    /// Key: endpoint name (e.g., "GET /health")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a single endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    fn read_metrics(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_metrics(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately. Each bridge takes its own copy
    /// when it starts, so runtime updates only affect calls that begin later.
    pub fn get_config(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Called by the metrics middleware for every request.
    pub fn increment_request_count(&self) {
        self.write_metrics().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.write_metrics().error_count += 1;
    }

    /// Record timing for one request to `endpoint` (e.g. "GET /health").
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write_metrics();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// A media bridge came up.
    pub fn call_started(&self) {
        let mut metrics = self.write_metrics();
        metrics.active_calls += 1;
        metrics.total_calls += 1;
    }

    /// A media bridge went away. Guards against underflow.
    pub fn call_ended(&self) {
        let mut metrics = self.write_metrics();
        metrics.active_calls = metrics.active_calls.saturating_sub(1);
    }

    /// A media bridge could not reach the agent.
    pub fn call_failed(&self) {
        self.write_metrics().failed_calls += 1;
    }

    /// Consistent copy of every counter, taken under one read lock.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.read_metrics().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of failed requests, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_counters() {
        let state = AppState::new(AppConfig::default());
        state.call_started();
        state.call_started();
        state.call_ended();
        state.call_failed();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.active_calls, 1);
        assert_eq!(snapshot.total_calls, 2);
        assert_eq!(snapshot.failed_calls, 1);
    }

    #[test]
    fn test_call_ended_never_underflows() {
        let state = AppState::new(AppConfig::default());
        state.call_ended();
        assert_eq!(state.get_metrics_snapshot().active_calls, 0);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_update_config_validates() {
        let state = AppState::new(AppConfig::default());
        let mut bad = AppConfig::default();
        bad.agent.connect_timeout_ms = 0;
        assert!(state.update_config(bad).is_err());
        assert_eq!(state.get_config().agent.connect_timeout_ms, 10_000);
    }
}
