//! Function endpoint: POST / runs the dispatcher on the raw body.

use crate::config::{self, Config};
use crate::dispatch::Dispatcher;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct FunctionState {
    pub dispatcher: Dispatcher,
    /// Reported by the health probe.
    pub gateway_url: String,
}

pub fn function_router(state: FunctionState) -> Router {
    Router::new()
        .route("/", post(dispatch_http))
        .route("/health", get(health_http))
        .with_state(state)
}

/// Run the function endpoint on config.function.bind:config.function.port until SIGINT/SIGTERM.
pub async fn run_function(config: Config) -> Result<()> {
    let gateway_url = config::resolve_gateway_base_url(&config);
    let dispatcher = Dispatcher::with_base_url(&gateway_url, config.gateway.timeout())
        .context("building gateway client")?;
    let bind_addr = format!("{}:{}", config.function.bind.trim(), config.function.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!(
        "function listening on {}, forwarding to {}",
        bind_addr,
        gateway_url
    );
    let state = FunctionState {
        dispatcher,
        gateway_url,
    };
    serve_function(listener, state, super::shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` completes.
pub async fn serve_function<F>(listener: TcpListener, state: FunctionState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, function_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("function server exited")?;
    log::info!("function server stopped");
    Ok(())
}

/// POST /: body is the raw request; rejected commands get 400 with the reason.
async fn dispatch_http(State(state): State<FunctionState>, body: Bytes) -> Response {
    match state.dispatcher.dispatch(&body).await {
        Ok(out) => (StatusCode::OK, out).into_response(),
        Err(e) => {
            log::debug!("rejected request: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

/// GET /health returns a simple JSON body (for probes).
async fn health_http(State(state): State<FunctionState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "gateway": state.gateway_url,
    }))
}
