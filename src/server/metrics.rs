use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

/// Counters for the prediction service
#[derive(Debug)]
pub struct ModelStats {
    /// Trips predicted successfully
    pub prediction_count: AtomicUsize,
    /// Requests that reached inference
    pub batch_count: AtomicUsize,
    /// Requests that failed during feature building or inference
    pub prediction_errors: AtomicUsize,
    /// Requests rejected before inference (bad payload or validation)
    pub rejected_requests: AtomicUsize,
    /// Latest batch latency in microseconds
    pub latest_prediction_latency_us: AtomicUsize,
    /// Creation timestamp
    pub created_at: SystemTime,
    /// Seconds since the epoch at which the artifacts were loaded, 0 if never
    pub loaded_at: AtomicU64,
}

impl ModelStats {
    pub fn new() -> Self {
        Self {
            prediction_count: AtomicUsize::new(0),
            batch_count: AtomicUsize::new(0),
            prediction_errors: AtomicUsize::new(0),
            rejected_requests: AtomicUsize::new(0),
            latest_prediction_latency_us: AtomicUsize::new(0),
            created_at: SystemTime::now(),
            loaded_at: AtomicU64::new(0),
        }
    }

    pub fn mark_loaded(&self) {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.loaded_at.store(now, Ordering::SeqCst);
    }

    pub fn record_success(&self, trips: usize, elapsed: Duration) {
        self.batch_count.fetch_add(1, Ordering::Relaxed);
        self.prediction_count.fetch_add(trips, Ordering::Relaxed);
        let micros = usize::try_from(elapsed.as_micros()).unwrap_or(usize::MAX);
        self.latest_prediction_latency_us.store(micros, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.batch_count.fetch_add(1, Ordering::Relaxed);
        self.prediction_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn predictions(&self) -> usize {
        self.prediction_count.load(Ordering::Relaxed)
    }

    /// Get formatted statistics as a string
    pub fn format_stats(&self) -> String {
        format!(
            "Predictions: {} | Requests: {} | Errors: {} | Rejected: {} | Latency: {}μs | Uptime: {}s",
            self.prediction_count.load(Ordering::Relaxed),
            self.batch_count.load(Ordering::Relaxed),
            self.prediction_errors.load(Ordering::Relaxed),
            self.rejected_requests.load(Ordering::Relaxed),
            self.latest_prediction_latency_us.load(Ordering::Relaxed),
            self.uptime_secs(),
        )
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.created_at)
            .unwrap_or_default()
            .as_secs()
    }
}

impl Default for ModelStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_stats_basics() {
        let stats = ModelStats::new();
        assert_eq!(stats.predictions(), 0);
        assert_eq!(stats.loaded_at.load(Ordering::Relaxed), 0);

        stats.record_success(10, Duration::from_micros(250));
        stats.record_success(2, Duration::from_micros(40));
        assert_eq!(stats.predictions(), 12);
        assert_eq!(stats.batch_count.load(Ordering::Relaxed), 2);
        assert_eq!(stats.latest_prediction_latency_us.load(Ordering::Relaxed), 40);

        stats.mark_loaded();
        assert!(stats.loaded_at.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_error_counters() {
        let stats = ModelStats::new();
        stats.record_failure();
        stats.record_rejection();
        stats.record_rejection();
        assert_eq!(stats.prediction_errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.rejected_requests.load(Ordering::Relaxed), 2);
        assert_eq!(stats.predictions(), 0);

        let formatted = stats.format_stats();
        assert!(formatted.contains("Errors: 1"));
        assert!(formatted.contains("Rejected: 2"));
    }
}
