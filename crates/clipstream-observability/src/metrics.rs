use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Record Metrics
    // ============================================================================

    /// Valid records seen, by pipeline side (producer/consumer) and event kind
    pub static ref RECORDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clipstream_records_total", "Total valid records seen"),
        &["side", "kind"]
    ).expect("metric can be created");

    /// Rejected lines, by side and reason (malformed_line, unknown_kind)
    pub static ref PARSE_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clipstream_parse_errors_total", "Total lines rejected by the record codec"),
        &["side", "reason"]
    ).expect("metric can be created");

    // ============================================================================
    // Transport Metrics
    // ============================================================================

    /// Batches published by the producer
    pub static ref BATCHES_PUBLISHED_TOTAL: IntCounter = IntCounter::new(
        "clipstream_batches_published_total",
        "Total batch messages published"
    ).expect("metric can be created");

    /// Batches received by the consumer
    pub static ref BATCHES_RECEIVED_TOTAL: IntCounter = IntCounter::new(
        "clipstream_batches_received_total",
        "Total batch messages received"
    ).expect("metric can be created");

    /// Payloads the consumer could not decode at all
    pub static ref UNDECODABLE_PAYLOADS_TOTAL: IntCounter = IntCounter::new(
        "clipstream_undecodable_payloads_total",
        "Total payloads that were not valid UTF-8"
    ).expect("metric can be created");

    // ============================================================================
    // Write Metrics
    // ============================================================================

    /// Rows inserted, by table
    pub static ref ROWS_WRITTEN_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clipstream_rows_written_total", "Total rows written"),
        &["table"]
    ).expect("metric can be created");

    /// Failed entity writes, by table and cause
    pub static ref WRITE_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clipstream_write_errors_total", "Total failed entity writes"),
        &["table", "cause"] // connection_failure, constraint_violation, timeout, query
    ).expect("metric can be created");

    /// Write retries, by table
    pub static ref WRITE_RETRIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clipstream_write_retries_total", "Total write attempts that were retried"),
        &["table"]
    ).expect("metric can be created");

    /// Entity write latency, including retries
    pub static ref WRITE_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("clipstream_write_latency_seconds", "Entity write latency in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["table"]
    ).expect("metric can be created");

    /// Batch writes dispatched but not yet settled
    pub static ref INFLIGHT_BATCHES: IntGauge = IntGauge::new(
        "clipstream_inflight_batches",
        "Number of batch writes in flight"
    ).expect("metric can be created");

    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Closed sessions, by outcome (clean, degraded, recompute_failed, shutdown)
    pub static ref SESSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clipstream_sessions_total", "Total sessions closed"),
        &["outcome"]
    ).expect("metric can be created");

    /// Leaderboard recomputation latency
    pub static ref RECOMPUTE_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new("clipstream_recompute_latency_seconds", "Leaderboard recompute latency in seconds")
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0])
    ).expect("metric can be created");

    /// View count of the current most-watched video
    pub static ref LEADERBOARD_VIEW_COUNT: IntGauge = IntGauge::new(
        "clipstream_leaderboard_view_count",
        "View count of the most-watched video"
    ).expect("metric can be created");

    // ============================================================================
    // API Metrics
    // ============================================================================

    /// Reporting API requests, by endpoint and status code
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clipstream_api_requests_total", "Total reporting API requests"),
        &["endpoint", "status"]
    ).expect("metric can be created");
}

/// Initialize metrics registry
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        // Record metrics
        REGISTRY
            .register(Box::new(RECORDS_TOTAL.clone()))
            .expect("records_total can be registered");
        REGISTRY
            .register(Box::new(PARSE_ERRORS_TOTAL.clone()))
            .expect("parse_errors_total can be registered");

        // Transport metrics
        REGISTRY
            .register(Box::new(BATCHES_PUBLISHED_TOTAL.clone()))
            .expect("batches_published_total can be registered");
        REGISTRY
            .register(Box::new(BATCHES_RECEIVED_TOTAL.clone()))
            .expect("batches_received_total can be registered");
        REGISTRY
            .register(Box::new(UNDECODABLE_PAYLOADS_TOTAL.clone()))
            .expect("undecodable_payloads_total can be registered");

        // Write metrics
        REGISTRY
            .register(Box::new(ROWS_WRITTEN_TOTAL.clone()))
            .expect("rows_written_total can be registered");
        REGISTRY
            .register(Box::new(WRITE_ERRORS_TOTAL.clone()))
            .expect("write_errors_total can be registered");
        REGISTRY
            .register(Box::new(WRITE_RETRIES_TOTAL.clone()))
            .expect("write_retries_total can be registered");
        REGISTRY
            .register(Box::new(WRITE_LATENCY.clone()))
            .expect("write_latency can be registered");
        REGISTRY
            .register(Box::new(INFLIGHT_BATCHES.clone()))
            .expect("inflight_batches can be registered");

        // Session metrics
        REGISTRY
            .register(Box::new(SESSIONS_TOTAL.clone()))
            .expect("sessions_total can be registered");
        REGISTRY
            .register(Box::new(RECOMPUTE_LATENCY.clone()))
            .expect("recompute_latency can be registered");
        REGISTRY
            .register(Box::new(LEADERBOARD_VIEW_COUNT.clone()))
            .expect("leaderboard_view_count can be registered");

        // API metrics
        REGISTRY
            .register(Box::new(API_REQUESTS_TOTAL.clone()))
            .expect("api_requests_total can be registered");
    });
}
