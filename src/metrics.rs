/// Metrics and telemetry for Media Lounge
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Object store writes and skipped records
/// - Verification code outcomes
/// - Background job execution

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter_vec, Encoder, Gauge,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Object Store Metrics ==========

    /// Records written by collection
    pub static ref STORE_WRITES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "store_writes_total",
        "Total number of records written to the object store",
        &["collection"]
    )
    .unwrap();

    /// Records or listings dropped from collection reads
    pub static ref STORE_ITEM_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "store_item_failures_total",
        "Total number of records skipped because they could not be read",
        &["collection"]
    )
    .unwrap();

    /// Media uploads by kind
    pub static ref MEDIA_UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "media_uploads_total",
        "Total number of uploaded files",
        &["kind"]
    )
    .unwrap();

    // ========== Verification Metrics ==========

    /// Verification code events by outcome
    pub static ref VERIFICATION_CODES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "verification_codes_total",
        "Verification codes issued and redemption outcomes",
        &["outcome"]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    )
    .unwrap();

    // ========== System Metrics ==========

    /// Application uptime in seconds
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "uptime_seconds",
        "Application uptime in seconds"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collapse per-media prefixes so label cardinality stays bounded
pub fn collection_label(prefix: &str) -> &str {
    for family in ["comments", "likes"] {
        if prefix
            .strip_prefix(family)
            .is_some_and(|rest| rest.starts_with('-'))
        {
            return family;
        }
    }
    prefix
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a record write
pub fn record_store_write(prefix: &str) {
    STORE_WRITES_TOTAL
        .with_label_values(&[collection_label(prefix)])
        .inc();
}

/// Record a record or listing skipped during a collection read
pub fn record_collection_skip(prefix: &str) {
    STORE_ITEM_FAILURES_TOTAL
        .with_label_values(&[collection_label(prefix)])
        .inc();
}

/// Record a media upload
pub fn record_media_upload(kind: &str) {
    MEDIA_UPLOADS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a verification event ("issued", "redeemed", or a failure kind)
pub fn record_verification(outcome: &str) {
    VERIFICATION_CODES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_label() {
        assert_eq!(collection_label("comments-media_a.png"), "comments");
        assert_eq!(collection_label("likes-x"), "likes");
        assert_eq!(collection_label("users"), "users");
        assert_eq!(collection_label("likesx"), "likesx");
    }

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/media", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_record_store_metrics() {
        record_store_write("likes-media_a.png");
        record_collection_skip("comments-media_a.png");
        let metrics = render_metrics();
        assert!(metrics.contains("store_writes_total"));
        assert!(metrics.contains("store_item_failures_total"));
        assert!(!metrics.contains("media_a.png"));
    }

    #[test]
    fn test_record_background_job() {
        record_background_job("verification_sweep", "success", 0.01);
        let metrics = render_metrics();
        assert!(metrics.contains("background_jobs_total"));
        assert!(metrics.contains("background_job_duration_seconds"));
    }
}
