//! Transaction metrics.
//!
//! # Metrics
//! - `apm_transactions_total` (counter): finished transactions by result
//! - `apm_transaction_duration_seconds` (histogram): transaction latency
//!
//! Recording is a no-op until the embedding binary installs a metrics
//! recorder.

use std::time::Duration;

/// Record one finished transaction.
pub fn record_transaction(result: &str, duration: Duration) {
    metrics::counter!("apm_transactions_total", "result" => result.to_string()).increment(1);
    metrics::histogram!("apm_transaction_duration_seconds").record(duration.as_secs_f64());
}
