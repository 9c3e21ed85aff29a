use axum::{
    Router, middleware,
    routing::{any, get},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::blocklist::Blocklist;
use crate::config::ServerArgs;
use crate::gate::gate;
use crate::handlers::{health_handler, index_handler, metrics_handler};
use crate::recorder::RequestRecorder;
use crate::state::AppState;

// Every route, the fallback included, sits behind the gate
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", any(index_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(index_handler)
        .layer(middleware::from_fn_with_state(state, gate))
}

// Serve on an already bound listener; the gate needs the peer address
pub async fn serve_on(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let app = router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await
}

pub async fn run(args: ServerArgs) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&args.log_root).await?;

    let state = Arc::new(AppState::new(
        Blocklist::new(&args.blacklist),
        RequestRecorder::new(&args.log_root),
    ));

    let addr = args.listen_addr();
    let listener = TcpListener::bind(&addr).await?;

    println!("Honeypot running on http://{}", addr);
    println!("Request logs: {}", args.log_root.display());
    println!("Blacklist: {}", args.blacklist.display());
    info!(addr = %addr, "Honeypot listening");

    serve_on(listener, state).await?;
    Ok(())
}
