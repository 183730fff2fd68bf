/// Prometheus metrics for the marketplace
///
/// - HTTP request counts and latencies
/// - Publishing and quota denials per plan
/// - Reports and moderation actions
/// - Expiry sweeps and other background jobs
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use tracing::error;

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, route, and status
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
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========== Listing Metrics ==========

    /// Listings published by effective plan
    pub static ref LISTINGS_PUBLISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "listings_published_total",
        "Total number of listings published",
        &["plan"]
    )
    .unwrap();

    /// Publish attempts refused by the monthly cap
    pub static ref QUOTA_DENIALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quota_denials_total",
        "Total number of publishes denied by the plan quota",
        &["plan"]
    )
    .unwrap();

    /// Listings moved to Expired by the sweep
    pub static ref LISTINGS_EXPIRED_TOTAL: IntCounter = register_int_counter!(
        "listings_expired_total",
        "Total number of listings expired by the sweep"
    )
    .unwrap();

    /// Images stored by file extension
    pub static ref IMAGE_UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "image_uploads_total",
        "Total number of listing images uploaded",
        &["format"]
    )
    .unwrap();

    // ========== Moderation Metrics ==========

    /// Reports filed by reason
    pub static ref REPORTS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "reports_created_total",
        "Total number of reports filed",
        &["reason"]
    )
    .unwrap();

    /// Suspensions and reactivations by source (auto or admin)
    pub static ref MODERATION_ACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "moderation_actions_total",
        "Total number of moderation actions",
        &["action", "source"]
    )
    .unwrap();

    // ========== Account Metrics ==========

    pub static ref ACCOUNT_REGISTRATIONS_TOTAL: IntCounter = register_int_counter!(
        "account_registrations_total",
        "Total number of accounts registered"
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
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8_lossy(&buffer).into_owned()
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

pub fn record_listing_published(plan: &str) {
    LISTINGS_PUBLISHED_TOTAL.with_label_values(&[plan]).inc();
}

pub fn record_quota_denied(plan: &str) {
    QUOTA_DENIALS_TOTAL.with_label_values(&[plan]).inc();
}

pub fn record_listings_expired(count: u64) {
    LISTINGS_EXPIRED_TOTAL.inc_by(count);
}

pub fn record_image_uploaded(format: &str) {
    IMAGE_UPLOADS_TOTAL.with_label_values(&[format]).inc();
}

pub fn record_report_filed(reason: &str) {
    REPORTS_CREATED_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a suspension or reactivation
pub fn record_moderation_action(action: &str, source: &str) {
    MODERATION_ACTIONS_TOTAL
        .with_label_values(&[action, source])
        .inc();
}

pub fn record_account_registered() {
    ACCOUNT_REGISTRATIONS_TOTAL.inc();
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
