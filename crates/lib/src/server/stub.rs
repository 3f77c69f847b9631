//! Acknowledgment stub: 200 with an empty body for any POST /.
//!
//! Connections are served by hyper directly so each one can be bounded:
//! - read: request headers must arrive within the read timeout; the handler
//!   gives the body the same budget, then answers 200 whether or not it all arrived
//! - write: any write left pending for the write timeout fails the connection
//! - idle: a keep-alive connection with no new request for the idle timeout is closed

use super::timeouts::{ConnClock, TimedIo};
use crate::config::{Config, StubConfig};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    routing::post,
    Router,
};
use futures_util::StreamExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tower::ServiceExt;

#[derive(Clone)]
struct StubState {
    read_timeout: Duration,
}

/// Router for the stub; `read_timeout` bounds how long the handler waits for a request body.
pub fn stub_router(read_timeout: Duration) -> Router {
    Router::new()
        .route("/", post(acknowledge))
        .with_state(StubState { read_timeout })
}

/// Run the stub on config.stub.bind:config.stub.port until SIGINT/SIGTERM.
pub async fn run_stub(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.stub.bind.trim(), config.stub.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("stub listening on {}", bind_addr);
    serve_stub(listener, &config.stub, super::shutdown_signal()).await
}

/// Accept connections on `listener` until `shutdown` completes, then wait for open connections to close.
pub async fn serve_stub<F>(listener: TcpListener, config: &StubConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let app = stub_router(config.read_timeout());
    let timeouts = ConnTimeouts {
        read: config.read_timeout(),
        write: config.write_timeout(),
        idle: config.idle_timeout(),
    };
    let (close_tx, close_rx) = watch::channel(());
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(a) => a,
                Err(e) => {
                    log::debug!("stub accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };
        tokio::spawn(serve_connection(
            stream,
            peer,
            app.clone(),
            timeouts,
            close_rx.clone(),
        ));
    }

    drop(listener);
    drop(close_rx);
    let _ = close_tx.send(());
    close_tx.closed().await;
    log::info!("stub stopped");
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct ConnTimeouts {
    read: Duration,
    write: Duration,
    idle: Duration,
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    timeouts: ConnTimeouts,
    mut close_rx: watch::Receiver<()>,
) {
    let clock = ConnClock::new(timeouts.read, timeouts.idle);
    let io = TokioIo::new(TimedIo::new(stream, clock.clone(), timeouts.write));
    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
        let app = app.clone();
        let clock = clock.clone();
        async move {
            clock.request_started();
            let res = app.oneshot(req).await;
            clock.request_finished();
            res
        }
    });
    let mut builder = http1::Builder::new();
    // Header and idle deadlines come from ConnClock.
    builder.timer(TokioTimer::new()).header_read_timeout(None::<Duration>);
    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);
    let mut closing = false;

    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    log::debug!("stub connection {} ended: {}", peer, e);
                }
                break;
            }
            _ = close_rx.changed(), if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

/// POST /: drain the body (bounded by the read timeout) and acknowledge.
async fn acknowledge(State(state): State<StubState>, body: Body) -> StatusCode {
    let drain = async {
        let mut stream = body.into_data_stream();
        let mut received = 0usize;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => received += bytes.len(),
                Err(e) => {
                    log::debug!("stub body read error: {}", e);
                    break;
                }
            }
        }
        received
    };
    match tokio::time::timeout(state.read_timeout, drain).await {
        Ok(received) => log::debug!("acknowledged POST / ({} bytes)", received),
        Err(_) => log::debug!("stub body not received within {:?}", state.read_timeout),
    }
    StatusCode::OK
}
