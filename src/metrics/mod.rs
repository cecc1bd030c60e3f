//! Metrics for the trust engine.
//!
//! Counters and gauges behind a shared registry, exported as JSON and
//! in Prometheus text format.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Global metrics registry
pub struct MetricsRegistry {
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,

    /// Gauge metrics (current values)
    gauges: RwLock<HashMap<String, Arc<AtomicU64>>>,

    /// Service start time
    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Increment a counter
    pub async fn inc_counter(&self, name: &str) {
        self.add_counter(name, 1).await;
    }

    /// Add to a counter
    pub async fn add_counter(&self, name: &str, value: u64) {
        let counters = self.counters.read().await;
        if let Some(counter) = counters.get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }
        drop(counters);

        // Create new counter
        let mut counters = self.counters.write().await;
        let counter = counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)));
        counter.fetch_add(value, Ordering::Relaxed);
    }

    /// Set a gauge value
    pub async fn set_gauge(&self, name: &str, value: u64) {
        let gauges = self.gauges.read().await;
        if let Some(gauge) = gauges.get(name) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }
        drop(gauges);

        // Create new gauge
        let mut gauges = self.gauges.write().await;
        gauges.insert(name.to_string(), Arc::new(AtomicU64::new(value)));
    }

    /// Get a counter value
    pub async fn get_counter(&self, name: &str) -> u64 {
        let counters = self.counters.read().await;
        counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Get a gauge value
    pub async fn get_gauge(&self, name: &str) -> u64 {
        let gauges = self.gauges.read().await;
        gauges
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get all metrics as JSON
    pub async fn to_json(&self) -> serde_json::Value {
        let counters = self.counters.read().await;
        let gauges = self.gauges.read().await;

        let counter_values: HashMap<String, u64> = counters
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();

        let gauge_values: HashMap<String, u64> = gauges
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();

        serde_json::json!({
            "uptime_seconds": self.uptime_seconds(),
            "counters": counter_values,
            "gauges": gauge_values,
        })
    }

    /// Export metrics in Prometheus format
    pub async fn to_prometheus(&self) -> String {
        let counters = self.counters.read().await;
        let gauges = self.gauges.read().await;

        let mut output = String::new();

        // Uptime
        output.push_str("# HELP trust_uptime_seconds Time since service start\n");
        output.push_str("# TYPE trust_uptime_seconds gauge\n");
        output.push_str(&format!("trust_uptime_seconds {}\n\n", self.uptime_seconds()));

        // Counters
        for (name, counter) in counters.iter() {
            let prometheus_name = name.replace(['.', '-'], "_");
            output.push_str(&format!("# TYPE {} counter\n", prometheus_name));
            output.push_str(&format!(
                "{} {}\n",
                prometheus_name,
                counter.load(Ordering::Relaxed)
            ));
        }

        // Gauges
        for (name, gauge) in gauges.iter() {
            let prometheus_name = name.replace(['.', '-'], "_");
            output.push_str(&format!("# TYPE {} gauge\n", prometheus_name));
            output.push_str(&format!(
                "{} {}\n",
                prometheus_name,
                gauge.load(Ordering::Relaxed)
            ));
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Predefined metric names
pub mod metric_names {
    // Verification
    pub const SUBMISSIONS_RECEIVED: &str = "trust.submissions.received";
    pub const SUBMISSIONS_APPROVED: &str = "trust.submissions.approved";
    pub const SUBMISSIONS_REJECTED: &str = "trust.submissions.rejected";
    pub const SUBMISSIONS_REVIEW: &str = "trust.submissions.needs_review";
    pub const REGISTRY_UNAVAILABLE: &str = "trust.registry.unavailable";

    // One-time codes
    pub const OTP_ISSUED: &str = "trust.otp.issued";
    pub const OTP_MATCHED: &str = "trust.otp.matched";
    pub const OTP_EXHAUSTED: &str = "trust.otp.exhausted";

    // Login throttling
    pub const LOGIN_FAILURES: &str = "trust.login.failures";
    pub const LOGIN_LOCKOUTS: &str = "trust.login.lockouts";
    pub const LOGIN_FAIL_OPEN: &str = "trust.login.fail_open";

    // Tokens
    pub const TOKENS_ISSUED: &str = "trust.tokens.issued";
    pub const TOKENS_ROTATED: &str = "trust.tokens.rotated";
    pub const TOKEN_REPLAYS: &str = "trust.tokens.replays";

    // Trials
    pub const TRIALS_STARTED: &str = "trust.trials.started";
    pub const TRIALS_EXPIRED: &str = "trust.trials.expired";
    pub const TRIALS_CONVERTED: &str = "trust.trials.converted";

    // Access decisions
    pub const ACCESS_EVALUATIONS: &str = "trust.access.evaluations";
    pub const ACCESS_HARD_BLOCKS: &str = "trust.access.hard_blocks";

    // Infrastructure
    pub const DATABASE_ERRORS: &str = "trust.errors.database";
    pub const DB_POOL_SIZE: &str = "trust.db.pool_size";
}
