//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use http_engine::config::EngineConfig;
use http_engine::http::{IterSource, Request, Response, StatusCode};
use http_engine::lifecycle;
use http_engine::routing::{Dispatcher, RouteController};
use http_engine::StopHandle;

/// A server running on an ephemeral port inside the test runtime.
pub struct TestServer {
    pub addr: SocketAddr,
    stop: StopHandle,
    task: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop accepting and wait for in-flight connections to drain.
    pub async fn shutdown(self) {
        self.stop.stop();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

/// Routes used by most tests.
pub fn demo_app() -> Dispatcher {
    let routes = RouteController::new("/")
        .get("/hello", |_: &Request| {
            let mut response = Response::new(StatusCode::OK);
            response.set_text("hello");
            response
        })
        .get("/echo/**", |request: &Request| {
            let mut response = Response::new(StatusCode::OK);
            response.set_text(format!("{} {}", request.method(), request.path()));
            response
        })
        .get("/stream", |_: &Request| {
            let mut response = Response::new(StatusCode::OK);
            let chunks = vec![b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()];
            response.set_stream(Box::new(IterSource::new(chunks)), "text/plain");
            response
        })
        .get("/private/**", |request: &Request| {
            let mut response = Response::new(StatusCode::OK);
            response.set_text(format!("secret for {}", request.username().unwrap_or("-")));
            response
        })
        .post("/submit", |_: &Request| {
            let mut response = Response::new(StatusCode::OK);
            response.set_text("accepted");
            response
        });
    Dispatcher::new().with_controller(routes)
}

/// Start `dispatcher` configured by `config` on 127.0.0.1 with a random port.
pub async fn start_server(config: EngineConfig, dispatcher: Dispatcher) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(lifecycle::build_server(&config, dispatcher));
    let stop = server.stop_handle();
    let task = tokio::spawn(async move {
        server.serve(listener).await.unwrap();
    });
    TestServer { addr, stop, task }
}

/// Write `request` and read until the server closes the connection.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("server did not close the connection")
        .unwrap();
    String::from_utf8_lossy(&out).into_owned()
}

/// Value of the first `Set-Cookie` for `name` in a raw response.
pub fn set_cookie(raw: &str, name: &str) -> Option<String> {
    raw.lines()
        .filter_map(|line| line.strip_prefix("Set-Cookie: "))
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v.to_string())
}

pub fn status_line(raw: &str) -> &str {
    raw.lines().next().unwrap_or_default()
}
