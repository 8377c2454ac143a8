//! Prometheus metrics for multi-node dispatch.
//!
//! [`DispatchMetrics`] owns a dedicated [`Registry`] that the hosting process
//! can encode into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts,
    Registry,
};

pub struct DispatchMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Dispatches started, labelled by operation.
    pub dispatches: IntCounterVec,
    /// Per-node calls that ended in a failure (timeouts included).
    pub node_failures: IntCounter,
    /// Per-node calls that hit their time bound.
    pub node_timeouts: IntCounter,
    /// Dispatches that stopped before every node answered.
    pub early_stops: IntCounter,
    /// Dispatches aborted by the caller (cancel token or deadline).
    pub aborted: IntCounter,
    /// Aggregates in which the answering nodes disagreed.
    pub inconsistent_responses: IntCounter,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Wall time from dispatch start to the stopping condition, in milliseconds.
    pub dispatch_latency_ms: Histogram,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatches = register_int_counter_vec_with_registry!(
            Opts::new("multinode_dispatches_total", "Dispatches started"),
            &["operation"],
            registry
        )
        .expect("failed to register dispatches counter");

        let node_failures = register_int_counter_with_registry!(
            Opts::new(
                "multinode_node_failures_total",
                "Per-node calls that failed"
            ),
            registry
        )
        .expect("failed to register node_failures counter");

        let node_timeouts = register_int_counter_with_registry!(
            Opts::new(
                "multinode_node_timeouts_total",
                "Per-node calls that timed out"
            ),
            registry
        )
        .expect("failed to register node_timeouts counter");

        let early_stops = register_int_counter_with_registry!(
            Opts::new(
                "multinode_early_stops_total",
                "Dispatches stopped before every node answered"
            ),
            registry
        )
        .expect("failed to register early_stops counter");

        let aborted = register_int_counter_with_registry!(
            Opts::new(
                "multinode_aborted_total",
                "Dispatches aborted by cancellation or deadline"
            ),
            registry
        )
        .expect("failed to register aborted counter");

        let inconsistent_responses = register_int_counter_with_registry!(
            Opts::new(
                "multinode_inconsistent_responses_total",
                "Aggregates in which answering nodes disagreed"
            ),
            registry
        )
        .expect("failed to register inconsistent_responses counter");

        // Exponential buckets covering 1 ms → ~16 s.
        let dispatch_latency_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "multinode_dispatch_latency_ms",
                "Dispatch latency in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 15).unwrap()),
            registry
        )
        .expect("failed to register dispatch_latency_ms histogram");

        Self {
            registry,
            dispatches,
            node_failures,
            node_timeouts,
            early_stops,
            aborted,
            inconsistent_responses,
            dispatch_latency_ms,
        }
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
