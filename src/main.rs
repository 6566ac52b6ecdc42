//! HTTP engine server binary.
//!
//! ```text
//! http-engine [--config engine.toml] [--workers N]
//! ```
//!
//! Serves a small status page at `/` and whatever the configuration's
//! security section adds (login pages, rules). Stops on SIGINT/SIGTERM
//! after in-flight requests drain.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use serde_json::json;

use http_engine::config::{load_config, EngineConfig};
use http_engine::lifecycle;
use http_engine::observability::{logging, metrics};
use http_engine::routing::{Dispatcher, JsonErrorHandler, RouteController};
use http_engine::{Response, StatusCode};

#[derive(Parser)]
#[command(name = "http-engine")]
#[command(about = "Embeddable HTTP/1.x engine", long_about = None)]
struct Args {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker threads, overriding `listener.worker_threads`
    #[arg(short, long)]
    workers: Option<usize>,
}

fn json_response(value: &serde_json::Value) -> Response {
    let mut response = Response::new(StatusCode::OK);
    match response.set_json(value) {
        Ok(()) => response,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode response");
            Response::stock(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn application() -> Dispatcher {
    let routes = RouteController::new("/")
        .get("/", |request| {
            json_response(&json!({
                "service": "http-engine",
                "version": env!("CARGO_PKG_VERSION"),
                "user": request.username().unwrap_or("anonymous"),
            }))
        })
        .get("/whoami", |request| json_response(&json!({ "credentials": request.credentials() })));
    Dispatcher::new()
        .with_controller(routes)
        .with_error_handler(JsonErrorHandler)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.listener.worker_threads = workers.max(1);
    }

    let format = logging::LogFormat::parse(&config.observability.log_format)
        .unwrap_or(logging::LogFormat::Pretty);
    logging::init_logging(&config.observability.log_level, format);

    if let Some(path) = &args.config {
        tracing::info!(path = %path.display(), "Configuration loaded");
    }

    if config.observability.metrics_enabled {
        let address: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(address);
    }

    let (server, _) = lifecycle::start(&config, application())?;
    let mut server = server.with_signal_handling(true);
    server.run(config.listener.worker_threads)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http_engine::login;
    use http_engine::security::{
        AuthRule, PasswordEncoder, Pbkdf2Sha256Encoder, SecurityContext, SimpleUserService,
        UserDetails, ACCESS_TOKEN_COOKIE,
    };
    use http_engine::Request;

    use super::*;

    fn secured() -> Dispatcher {
        let users = SimpleUserService::new().with_user(UserDetails::new(
            "scott",
            Pbkdf2Sha256Encoder::new(10).encode("tiger"),
            ["USER"],
        ));
        let security = SecurityContext::new("secret", "engine")
            .with_user_service(Arc::new(users))
            .with_rule(AuthRule::new("/whoami", ["USER"]));
        login::install(application(), security)
    }

    fn body(response: &Response) -> String {
        String::from_utf8_lossy(response.content().unwrap_or_default()).into_owned()
    }

    #[test]
    fn status_route_answers_root_only() {
        let dispatcher = application();
        let root = dispatcher.handle(Request::builder("GET", "/").build());
        assert!(body(&root).contains("\"service\":\"http-engine\""));

        let missing = dispatcher.handle(Request::builder("GET", "/nothing").build());
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn login_pages_are_not_shadowed() {
        let dispatcher = secured();

        let form = dispatcher.handle(Request::builder("GET", "/login").build());
        assert_eq!(form.status(), StatusCode::OK);
        assert!(body(&form).contains("Please sign in"));

        let signed_in = dispatcher.handle(
            Request::builder("POST", "/login")
                .header("Cookie", "csrf-token=t0k")
                .form(&[
                    ("username", "scott"),
                    ("password", "tiger"),
                    ("uri", "/whoami"),
                    ("_csrf", "t0k"),
                ])
                .build(),
        );
        assert_eq!(signed_in.status(), StatusCode::SEE_OTHER);
        let token = signed_in.cookie(ACCESS_TOKEN_COOKIE).unwrap();

        let who = dispatcher.handle(
            Request::builder("GET", "/whoami")
                .header("Cookie", format!("access_token={}; csrf-token=t0k", token))
                .build(),
        );
        assert_eq!(who.status(), StatusCode::OK);
        assert!(body(&who).contains("\"username\":\"scott\""));
    }
}
