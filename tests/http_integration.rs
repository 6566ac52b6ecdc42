//! End-to-end tests over real sockets.

use std::io::Write;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use http_engine::config::{load_config, EngineConfig, RuleConfig, UserConfig};
use http_engine::security::{PasswordEncoder, Pbkdf2Sha256Encoder};

mod common;

use common::{demo_app, raw_exchange, set_cookie, start_server, status_line};

fn secured_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.security.enabled = true;
    config.security.secret = "integration-secret".into();
    config.security.pbkdf2_iterations = 10;
    config.security.rules.push(RuleConfig {
        pattern: "/private/**".into(),
        roles: vec!["USER".into()],
    });
    config.security.users.push(UserConfig {
        username: "scott".into(),
        password: Pbkdf2Sha256Encoder::new(10).encode("tiger"),
        roles: vec!["USER".into()],
    });
    config
}

#[tokio::test]
async fn pipelined_requests_share_one_connection() {
    let server = start_server(EngineConfig::default(), demo_app()).await;

    let out = raw_exchange(
        server.addr,
        b"GET /echo/one HTTP/1.1\r\nHost: t\r\n\r\n\
          GET /echo/two HTTP/1.1\r\nHost: t\r\n\r\n\
          GET /echo/three HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert_eq!(out.matches("HTTP/1.1 200 OK").count(), 3);
    let one = out.find("GET /echo/one").unwrap();
    let two = out.find("GET /echo/two").unwrap();
    let three = out.find("GET /echo/three").unwrap();
    assert!(one < two && two < three);

    server.shutdown().await;
}

#[tokio::test]
async fn keep_alive_serves_sequential_requests() {
    let server = start_server(EngineConfig::default(), demo_app()).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    for _ in 0..2 {
        stream
            .write_all(b"GET /hello HTTP/1.1\r\nHost: t\r\n\r\n")
            .await
            .unwrap();
        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let reply = String::from_utf8_lossy(&buf[..n]);
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert!(reply.ends_with("hello"));
        assert!(!reply.contains("Connection: close"));
    }

    server.shutdown().await;
}

#[tokio::test]
async fn malformed_request_is_rejected_and_closed() {
    let server = start_server(EngineConfig::default(), demo_app()).await;

    let out = raw_exchange(server.addr, b"GET /hello HTTP/1.1\r\nNoColonHere\r\n\r\n").await;
    assert!(status_line(&out).starts_with("HTTP/1.1 400"));
    assert!(out.contains("Connection: close"));

    server.shutdown().await;
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let server = start_server(EngineConfig::default(), demo_app()).await;

    let out = raw_exchange(server.addr, b"GET /missing HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    assert!(status_line(&out).starts_with("HTTP/1.1 404"));

    server.shutdown().await;
}

#[tokio::test]
async fn streamed_body_is_chunked_for_http11() {
    let server = start_server(EngineConfig::default(), demo_app()).await;

    let out = raw_exchange(server.addr, b"GET /stream HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    assert!(out.contains("Transfer-Encoding: chunked"));
    assert!(out.ends_with("5\r\nalpha\r\n4\r\nbeta\r\n5\r\ngamma\r\n0\r\n\r\n"));

    server.shutdown().await;
}

#[tokio::test]
async fn streamed_body_is_raw_for_http10() {
    let server = start_server(EngineConfig::default(), demo_app()).await;

    let out = raw_exchange(server.addr, b"GET /stream HTTP/1.0\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.0 200 OK"));
    assert!(!out.contains("Transfer-Encoding"));
    assert!(out.contains("Connection: close"));
    assert!(out.ends_with("\r\n\r\nalphabetagamma"));

    server.shutdown().await;
}

#[tokio::test]
async fn head_has_headers_only() {
    let server = start_server(EngineConfig::default(), demo_app()).await;

    let out = raw_exchange(server.addr, b"HEAD /hello HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 200 OK"));
    assert!(out.ends_with("\r\n\r\n"));

    server.shutdown().await;
}

#[tokio::test]
async fn reqwest_client_round_trip() {
    let server = start_server(EngineConfig::default(), demo_app()).await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/hello")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "hello");

    let response = client.get(server.url("/stream")).send().await.unwrap();
    assert_eq!(response.text().await.unwrap(), "alphabetagamma");

    let response = client.delete(server.url("/hello")).send().await.unwrap();
    assert_eq!(response.status(), 405);

    server.shutdown().await;
}

#[tokio::test]
async fn protected_path_requires_login() {
    let server = start_server(secured_config(), demo_app()).await;

    let out = raw_exchange(server.addr, b"GET /private/x HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    assert!(status_line(&out).starts_with("HTTP/1.1 401"));
    assert!(out.contains("name=\"_csrf\""));
    assert!(set_cookie(&out, "csrf-token").is_some());

    server.shutdown().await;
}

#[tokio::test]
async fn post_without_csrf_token_is_forbidden() {
    let server = start_server(secured_config(), demo_app()).await;

    let body = "username=scott&password=tiger";
    let request = format!(
        "POST /login HTTP/1.1\r\nConnection: close\r\n\
         Content-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let out = raw_exchange(server.addr, request.as_bytes()).await;
    assert!(status_line(&out).starts_with("HTTP/1.1 403"));
    assert!(set_cookie(&out, "access_token").is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn login_flow_grants_access() {
    let server = start_server(secured_config(), demo_app()).await;

    let form = raw_exchange(server.addr, b"GET /login HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    assert!(status_line(&form).starts_with("HTTP/1.1 200"));
    let csrf = set_cookie(&form, "csrf-token").unwrap();

    let body = format!("_csrf={}&username=scott&password=tiger&uri=/private/x", csrf);
    let request = format!(
        "POST /login HTTP/1.1\r\nConnection: close\r\nCookie: csrf-token={}\r\n\
         Content-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        csrf,
        body.len(),
        body
    );
    let login = raw_exchange(server.addr, request.as_bytes()).await;
    assert!(status_line(&login).starts_with("HTTP/1.1 303"));
    assert!(login.contains("Location: /private/x"));
    let token = set_cookie(&login, "access_token").unwrap();

    let request = format!(
        "GET /private/x HTTP/1.1\r\nConnection: close\r\nCookie: access_token={}\r\n\r\n",
        token
    );
    let page = raw_exchange(server.addr, request.as_bytes()).await;
    assert!(status_line(&page).starts_with("HTTP/1.1 200"));
    assert!(page.ends_with("secret for scott"));

    server.shutdown().await;
}

#[tokio::test]
async fn config_file_drives_server() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[listener]
bind_address = "127.0.0.1"
port = 0

[http]
allowed_methods = ["GET"]
server_name = "test-engine"
"#
    )
    .unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.http.server_name, "test-engine");
    let server = start_server(config, demo_app()).await;

    let out = raw_exchange(server.addr, b"GET /hello HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    assert!(out.contains("Server: test-engine"));

    let out = raw_exchange(
        server.addr,
        b"POST /submit HTTP/1.1\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
    )
    .await;
    assert!(status_line(&out).starts_with("HTTP/1.1 400"));

    server.shutdown().await;
}
