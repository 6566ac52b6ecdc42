//! HTTP server: bind, run, stop.
//!
//! # Responsibilities
//! - Bind the listening socket
//! - Build the worker pool (a multi-thread runtime with N workers)
//! - Accept connections and spawn one connection actor per socket
//! - Stop accepting on `stop()`, then let in-flight connections drain
//!
//! # Design Decisions
//! - The dispatcher is frozen behind an `Arc` once serving starts
//! - `stop()` may be called from any thread, before or during `run`

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::Instrument;

use crate::http::ParserLimits;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::net::connection::{Connection, ConnectionError, ConnectionTracker};
use crate::net::listener::{bind_std, Listener, ListenerError};
use crate::observability;
use crate::routing::Dispatcher;

/// Failures of the server surface.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("server is not bound")]
    NotBound,
    #[error("failed to build runtime: {0}")]
    Runtime(std::io::Error),
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cloneable handle that stops a running server.
#[derive(Debug, Clone)]
pub struct StopHandle {
    shutdown: Arc<Shutdown>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

/// HTTP/1.x server around one dispatcher.
#[derive(Debug)]
pub struct HttpServer {
    dispatcher: Arc<Dispatcher>,
    limits: ParserLimits,
    max_connections: usize,
    listener: Option<std::net::TcpListener>,
    local_addr: Option<SocketAddr>,
    shutdown: Arc<Shutdown>,
    handle_signals: bool,
}

impl HttpServer {
    pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            limits: ParserLimits::default(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            listener: None,
            local_addr: None,
            shutdown: Arc::new(Shutdown::new()),
            handle_signals: false,
        }
    }

    pub fn with_limits(mut self, limits: ParserLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    /// Stop on SIGINT/SIGTERM while `run` is serving.
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Bind the listening socket. Port 0 picks an ephemeral port.
    pub fn bind(&mut self, address: &str, port: u16) -> Result<SocketAddr, ServerError> {
        let listener = bind_std(address, port)?;
        let local = listener.local_addr()?;
        self.listener = Some(listener);
        self.local_addr = Some(local);
        Ok(local)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    pub fn shutdown(&self) -> Arc<Shutdown> {
        Arc::clone(&self.shutdown)
    }

    /// Stop accepting and let connections drain.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Serve on a runtime with `worker_count` threads until stopped.
    pub fn run(&mut self, worker_count: usize) -> Result<(), ServerError> {
        let listener = self.listener.take().ok_or(ServerError::NotBound)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_count.max(1))
            .thread_name("http-worker")
            .enable_all()
            .build()
            .map_err(ServerError::Runtime)?;

        tracing::info!(workers = worker_count.max(1), "Worker pool started");
        runtime.block_on(async {
            if self.handle_signals {
                signals::install(self.shutdown());
            }
            let listener = TcpListener::from_std(listener)?;
            self.serve(listener).await
        })
    }

    /// Accept loop on an existing listener; returns once drained.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let listener = Listener::new(listener, self.max_connections);
        let address = listener.local_addr()?;
        tracing::info!(address = %address, "HTTP server starting");

        let tracker = ConnectionTracker::new();
        loop {
            if self.shutdown.is_triggered() {
                break;
            }
            let accepted = tokio::select! {
                _ = self.shutdown.wait() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = tracker.track();
                    let span = observability::tracing::connection_span(guard.id(), peer);
                    let connection = Connection::from_tcp(
                        stream,
                        peer,
                        Arc::clone(&self.dispatcher),
                        self.limits,
                        Arc::clone(&self.shutdown),
                    );
                    tokio::spawn(
                        async move {
                            match connection.run().await {
                                Ok(()) | Err(ConnectionError::Parse(_)) => {}
                                Err(e) => tracing::debug!(error = %e, "Connection aborted"),
                            }
                            drop(permit);
                            drop(guard);
                        }
                        .instrument(span),
                    );
                }
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            }
        }

        drop(listener);
        tracing::info!(active = tracker.active_count(), "Listener closed, draining connections");
        tracker.wait_for_shutdown().await;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
