//! HTTP surfaces: the dispatcher function endpoint and the acknowledgment stub.
//!
//! The two servers share nothing but the shutdown signal; each binds its own port.

mod function;
mod stub;
mod timeouts;

pub use function::{function_router, run_function, serve_function, FunctionState};
pub use stub::{run_stub, serve_stub, stub_router};

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}
