//! Purpose: HTTP handlers plus an in-process test server and the long-running `serve` loop.
//! Exports: `user_router`, `block_router`, `LocalServer`, `ServeConfig`, `serve`, `validate_config`.
//! Role: Axum server for the user endpoint; `LocalServer` runs any router on a private runtime.
//! Invariants: The user endpoint answers 405 for non-POST, 400 for undecodable JSON, 202 otherwise.
//! Invariants: Loopback-only unless explicitly allowed.
//! Notes: The block handler never responds; only call it with a client deadline.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;

use crate::core::error::{Error, ErrorKind};
use crate::listen::{DEFAULT_PROBE_ADDR, bind_listener};
use crate::user::decode_first;

pub const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Router whose every path decodes a `User` from a POST body.
pub fn user_router() -> Router {
    Router::new().fallback(post_user)
}

/// Router whose every path waits forever without writing a response.
pub fn block_router() -> Router {
    Router::new().fallback(block_indefinitely)
}

async fn post_user(method: Method, body: Bytes) -> Response {
    if method != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    match decode_first(&body) {
        Ok(user) => {
            tracing::debug!(first = %user.first, last = %user.last, "decoded user");
            StatusCode::ACCEPTED.into_response()
        }
        Err(err) => {
            tracing::warn!(error = %err, "user decode failed");
            (StatusCode::BAD_REQUEST, "Decode Failed").into_response()
        }
    }
}

async fn block_indefinitely() -> Response {
    std::future::pending::<Response>().await
}

/// A router served on `127.0.0.1:<ephemeral>` from a private runtime.
///
/// Dropping the server stops accepting connections and abandons in-flight
/// handlers, including ones that never complete.
pub struct LocalServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    runtime: Option<Runtime>,
}

impl LocalServer {
    pub fn start(router: Router) -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to start runtime")
                    .with_source(err)
            })?;

        let bind: SocketAddr = DEFAULT_PROBE_ADDR
            .parse()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("invalid loopback address"))?;
        let std_listener = bind_listener(bind)?;
        let addr = std_listener.local_addr();
        let std_listener = std_listener.into_inner();
        std_listener.set_nonblocking(true).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to make listener non-blocking")
                .with_source(err)
        })?;
        let listener = {
            let _guard = runtime.enter();
            tokio::net::TcpListener::from_std(std_listener).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to register listener")
                    .with_source(err)
            })?
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        runtime.spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = result {
                tracing::error!(error = %err, "local server failed");
            }
        });
        tracing::debug!(%addr, "local server started");

        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            runtime: Some(runtime),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;

    let app = user_router()
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    let local_addr = listener.local_addr().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read bound address")
            .with_source(err)
    })?;
    tracing::info!(addr = %local_addr, "serving user endpoint");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

pub fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}
