//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated `EngineConfig` into a ready dispatcher
//! - Build the security context (users, digest store, rules, login pages)
//! - Build the server and bind its listening socket
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Applications mount their own controllers first; config is layered on top
//! - Listeners bind last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::{EngineConfig, SecurityConfig};
use crate::http::server::{HttpServer, ServerError};
use crate::http::ParserLimits;
use crate::login;
use crate::routing::Dispatcher;
use crate::security::{
    AuthRule, DigestAuthenticator, Pbkdf2Sha256Encoder, SecurityContext, SimpleDigestStore,
    SimpleUserService, UserDetails,
};

/// Security context described by the `[security]` section.
pub fn build_security(config: &SecurityConfig) -> SecurityContext {
    let mut users = SimpleUserService::new();
    for user in &config.users {
        users.add_user(UserDetails::new(
            user.username.clone(),
            user.password.clone(),
            user.roles.iter().cloned(),
        ));
    }

    let lifetime = (config.token_lifetime_secs > 0)
        .then(|| Duration::from_secs(config.token_lifetime_secs));
    let mut security = SecurityContext::new(config.secret.as_bytes(), config.realm.clone())
        .with_encoder(Arc::new(Pbkdf2Sha256Encoder::new(config.pbkdf2_iterations)))
        .with_user_service(Arc::new(users))
        .with_default_allow(config.default_allow)
        .with_csrf_validation(config.validate_csrf)
        .with_token_lifetime(lifetime);

    if config.digest_enabled {
        let mut store = SimpleDigestStore::new(config.realm.clone());
        for user in &config.digest_users {
            store.add_user(&user.username, &user.password, user.roles.iter().cloned());
        }
        security = security.with_digest(DigestAuthenticator::new(
            config.realm.clone(),
            Duration::from_secs(config.nonce_ttl_secs),
            Arc::new(store),
        ));
    }

    for rule in &config.rules {
        security.add_rule(AuthRule::new(&rule.pattern, rule.roles.iter().cloned()));
    }

    tracing::debug!(
        users = config.users.len(),
        digest_users = config.digest_users.len(),
        rules = config.rules.len(),
        digest = config.digest_enabled,
        "Security context built"
    );
    security
}

/// Layer the `[http]` and `[security]` sections over an application dispatcher.
pub fn configure_dispatcher(config: &EngineConfig, dispatcher: Dispatcher) -> Dispatcher {
    let http = &config.http;
    let dispatcher = dispatcher
        .with_allowed_methods(http.allowed_methods.iter().cloned())
        .with_trust_forwarded(http.trust_forwarded)
        .with_server_name(http.server_name.clone())
        .with_request_id_header(http.request_id_header.clone());

    if !config.security.enabled {
        return dispatcher;
    }

    let security = build_security(&config.security);
    if config.security.login_enabled {
        login::install(dispatcher, security)
    } else {
        dispatcher.with_security(Arc::new(security))
    }
}

/// Unbound server for `config` around an application dispatcher.
pub fn build_server(config: &EngineConfig, dispatcher: Dispatcher) -> HttpServer {
    HttpServer::new(configure_dispatcher(config, dispatcher))
        .with_limits(ParserLimits::from(&config.limits))
        .with_max_connections(config.listener.max_connections)
}

/// Build the server and bind `[listener]`; returns the bound address.
pub fn start(
    config: &EngineConfig,
    dispatcher: Dispatcher,
) -> Result<(HttpServer, SocketAddr), ServerError> {
    let mut server = build_server(config, dispatcher);
    let address = server.bind(&config.listener.bind_address, config.listener.port)?;
    tracing::info!(
        address = %address,
        workers = config.listener.worker_threads,
        max_connections = config.listener.max_connections,
        security = config.security.enabled,
        "Server bound"
    );
    Ok((server, address))
}
