use lazy_static::lazy_static;
use prometheus::{Counter, Histogram, register_counter, register_histogram};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("honeypot_requests_total", "Total number of allowed requests").unwrap();
    pub static ref BLOCKED_TOTAL: Counter =
        register_counter!("honeypot_blocked_requests_total", "Requests refused because the IP is blacklisted").unwrap();
    pub static ref RECORD_FAILURES: Counter =
        register_counter!("honeypot_record_failures_total", "Requests that could not be written to the request log").unwrap();
    pub static ref RECORD_LATENCY: Histogram = register_histogram!(
        "honeypot_record_latency_seconds",
        "Time spent appending a request record"
    )
    .unwrap();
}
