use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::metrics::{BLOCKED_TOTAL, RECORD_FAILURES, RECORD_LATENCY, REQUEST_TOTAL};
use crate::models::RequestRecord;
use crate::state::AppState;

pub const DENIAL_MESSAGE: &str =
    "Access Denied: Your IP has been blacklisted due to suspicious activity.";

pub fn denial() -> Response {
    (StatusCode::UNAUTHORIZED, DENIAL_MESSAGE).into_response()
}

// Runs in front of every route. Blacklisted IPs get the 401 and are not
// recorded; everyone else is recorded exactly once, here, then passed on.
pub async fn gate(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let ip = addr.ip().to_string();

    if state.blocklist.is_blocked(&ip).await {
        BLOCKED_TOTAL.inc();
        warn!("Blacklisted IP {ip} attempted to access the server");
        return denial();
    }

    REQUEST_TOTAL.inc();

    let record = RequestRecord::capture(&ip, req.method().as_str(), req.uri().path(), req.headers());
    info!(
        ip = %record.ip,
        user_agent = record.user_agent.as_deref().unwrap_or("None"),
        method = %record.method,
        path = %record.path,
        "Client request"
    );

    // recording is best effort, the visitor is served either way
    let start_time = Instant::now();
    if let Err(e) = state.recorder.record(&record).await {
        RECORD_FAILURES.inc();
        error!(ip = %ip, error = %e, "Failed to record request");
    }
    RECORD_LATENCY.observe(start_time.elapsed().as_secs_f64());

    next.run(req).await
}
