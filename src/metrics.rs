//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("projectforms_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");

    // GitHub Metrics
    pub static ref GITHUB_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("projectforms_github_requests_total", "Total number of GitHub API requests"),
        &["operation", "status"]
    ).expect("metric can be created");
    pub static ref GITHUB_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "projectforms_github_request_duration_seconds",
            "GitHub API request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"]
    ).expect("metric can be created");
    pub static ref OAUTH_OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("projectforms_oauth_operations_total", "Total number of OAuth endpoint operations"),
        &["operation", "status"]
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("projectforms_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("projectforms_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("projectforms_cache_size", "Current number of items in cache"),
        &["cache_name"]
    ).expect("metric can be created");

    // Form Metrics
    pub static ref PAGE_STATES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("projectforms_page_states_total", "Form page renders by resolved stage"),
        &["state"]
    ).expect("metric can be created");
    pub static ref ISSUES_SUBMITTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("projectforms_issues_submitted_total", "Total number of issue submissions"),
        &["status"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("projectforms_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; later calls leave the registry as is.
pub fn init_metrics() {
    let collectors: Vec<(&str, Box<dyn prometheus::core::Collector>)> = vec![
        ("HTTP_REQUESTS_TOTAL", Box::new(HTTP_REQUESTS_TOTAL.clone())),
        ("GITHUB_REQUESTS_TOTAL", Box::new(GITHUB_REQUESTS_TOTAL.clone())),
        (
            "GITHUB_REQUEST_DURATION_SECONDS",
            Box::new(GITHUB_REQUEST_DURATION_SECONDS.clone()),
        ),
        ("OAUTH_OPERATIONS_TOTAL", Box::new(OAUTH_OPERATIONS_TOTAL.clone())),
        ("CACHE_HITS_TOTAL", Box::new(CACHE_HITS_TOTAL.clone())),
        ("CACHE_MISSES_TOTAL", Box::new(CACHE_MISSES_TOTAL.clone())),
        ("CACHE_SIZE", Box::new(CACHE_SIZE.clone())),
        ("PAGE_STATES_TOTAL", Box::new(PAGE_STATES_TOTAL.clone())),
        ("ISSUES_SUBMITTED_TOTAL", Box::new(ISSUES_SUBMITTED_TOTAL.clone())),
        ("ERRORS_TOTAL", Box::new(ERRORS_TOTAL.clone())),
    ];

    for (name, collector) in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(error) => tracing::error!(metric = name, %error, "Failed to register metric"),
        }
    }

    tracing::info!("Metrics registry initialized");
}

/// Record the outcome and latency of one GitHub API call
pub fn observe_github_request(operation: &str, status: &str, started: std::time::Instant) {
    GITHUB_REQUESTS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
    GITHUB_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(started.elapsed().as_secs_f64());
}
