use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("chat_requests_total", "Total number of chat requests").unwrap();
    pub static ref DENIED_TOTAL: CounterVec = register_counter_vec!(
        "chat_requests_denied_total",
        "Chat requests refused by admission control",
        &["reason"]
    )
    .unwrap();
    pub static ref UPSTREAM_FAILURES: Counter =
        register_counter!("chat_upstream_failures_total", "Failed upstream calls").unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "chat_upstream_latency_seconds",
        "Upstream model call latency in seconds"
    )
    .unwrap();
    pub static ref ESTIMATED_SPEND: Gauge = register_gauge!(
        "chat_estimated_spend",
        "Estimated spend in the current spend window"
    )
    .unwrap();
    pub static ref TRACKED_CLIENTS: Gauge = register_gauge!(
        "chat_tracked_clients",
        "Client windows currently held in memory"
    )
    .unwrap();
}
