use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref AUTH_EVENTS_COUNTER: CounterVec = register_counter_vec!(
        "api_auth_events_total",
        "Authentication events by kind and outcome",
        &["event", "outcome"]
    ).unwrap();
}

pub fn record(event: &str, outcome: &str) {
    AUTH_EVENTS_COUNTER.with_label_values(&[event, outcome]).inc();
}
